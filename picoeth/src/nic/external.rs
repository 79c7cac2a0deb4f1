//! A software nic whose frames come from and go to the host program.
//!
//! Frames to be received are queued by the caller, every sent frame is recorded. A peer can be
//! scripted as a closure that sees each sent frame and may answer with a frame that is queued for
//! reception immediately. This makes request/response exchanges run synchronously inside a single
//! `update` of the stack.
use std::collections::VecDeque;
use std::vec::Vec;
use std::boxed::Box;

use crate::wire::EthernetAddress;
use super::{Device, Error, Result};

/// The scripted peer, answering sent frames.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>>>;

/// A nic backed by host memory.
pub struct External {
    mac: EthernetAddress,
    /// Frames waiting to be received.
    inbox: VecDeque<Vec<u8>>,
    /// All frames sent so far, oldest first.
    sent: Vec<Vec<u8>>,
    responder: Option<Responder>,
    link: bool,
    corrupt: bool,
    reinitialized: usize,
}

impl External {
    /// A nic with the given hardware address, link up, nothing queued.
    pub fn new(mac: EthernetAddress) -> Self {
        External {
            mac,
            inbox: VecDeque::new(),
            sent: Vec::new(),
            responder: None,
            link: true,
            corrupt: false,
            reinitialized: 0,
        }
    }

    /// Queue a frame to be received.
    pub fn push_frame(&mut self, frame: Vec<u8>) {
        self.inbox.push_back(frame);
    }

    /// Number of frames not yet received.
    pub fn to_recv(&self) -> usize {
        self.inbox.len()
    }

    /// Install the peer answering sent frames.
    pub fn set_responder<F>(&mut self, responder: F)
        where F: FnMut(&[u8]) -> Option<Vec<u8>> + 'static
    {
        self.responder = Some(Box::new(responder));
    }

    /// Remove the scripted peer, sent frames go unanswered.
    pub fn clear_responder(&mut self) {
        self.responder = None;
    }

    /// All frames sent so far.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Take the record of sent frames, leaving it empty.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        core::mem::replace(&mut self.sent, Vec::new())
    }

    /// Change the reported link status.
    pub fn set_link(&mut self, up: bool) {
        self.link = up;
    }

    /// Make the next receive report a corrupted card.
    pub fn corrupt_next_receive(&mut self) {
        self.corrupt = true;
    }

    /// How often the card was reinitialized.
    pub fn reinitialized(&self) -> usize {
        self.reinitialized
    }
}

impl Device for External {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.sent.push(frame.to_vec());
        let answer = match self.responder.as_mut() {
            Some(responder) => responder(frame),
            None => None,
        };
        if let Some(answer) = answer {
            self.inbox.push_back(answer);
        }
        Ok(())
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.corrupt {
            self.corrupt = false;
            return Err(Error::Corrupted);
        }

        let frame = match self.inbox.pop_front() {
            Some(frame) => frame,
            None => return Ok(0),
        };

        // A real card would report a length past its own buffer.
        if frame.len() > buffer.len() {
            return Err(Error::Corrupted);
        }

        buffer[..frame.len()].copy_from_slice(&frame);
        Ok(frame.len())
    }

    fn mac_address(&self) -> EthernetAddress {
        self.mac
    }

    fn link_status(&mut self) -> bool {
        self.link
    }

    fn reinitialize(&mut self) {
        self.reinitialized += 1;
        self.inbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responder_answers_into_inbox() {
        let mut nic = External::new(EthernetAddress([0, 1, 2, 3, 4, 5]));
        nic.set_responder(|frame| Some(frame.iter().rev().cloned().collect()));
        nic.send(&[1, 2, 3]).unwrap();

        let mut buffer = [0; 8];
        assert_eq!(nic.receive(&mut buffer), Ok(3));
        assert_eq!(&buffer[..3], &[3, 2, 1]);
        assert_eq!(nic.receive(&mut buffer), Ok(0));
        assert_eq!(nic.sent(), &[vec![1, 2, 3]][..]);
    }

    #[test]
    fn oversized_frame_is_corruption() {
        let mut nic = External::new(EthernetAddress([0, 1, 2, 3, 4, 5]));
        nic.push_frame(vec![0; 16]);
        let mut buffer = [0; 8];
        assert_eq!(nic.receive(&mut buffer), Err(Error::Corrupted));
    }
}
