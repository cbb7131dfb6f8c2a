//! In-process communicator connecting ranks that run on separate threads
use super::Communicator;
use crate::types::{Error, Result};
use std::sync::mpsc::{channel, Receiver, Sender};

#[derive(Debug)]
enum Packet {
    Data(Vec<u8>),
    Reduce(Vec<f64>),
    Barrier,
}

impl Packet {
    fn kind(&self) -> &'static str {
        match self {
            Packet::Data(_) => "data",
            Packet::Reduce(_) => "reduction",
            Packet::Barrier => "barrier",
        }
    }
}

/// One rank of a group of ranks living in the same process.
///
/// Every pair of ranks is connected by a channel. Collectives are gathered
/// on rank 0, which combines the contributions in rank order and sends the
/// result back.
#[derive(Debug)]
pub struct ChannelComm {
    rank: usize,
    size: usize,
    outbox: Vec<Sender<Packet>>,
    inbox: Vec<Receiver<Packet>>,
}

impl ChannelComm {
    /// Create the communicators of `size` connected ranks.
    pub fn create(size: usize) -> Vec<ChannelComm> {
        assert!(size > 0, "At least one rank is needed");
        let mut outboxes: Vec<Vec<Sender<Packet>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Packet>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        for outbox in outboxes.iter_mut() {
            for inbox in inboxes.iter_mut() {
                let (tx, rx) = channel();
                outbox.push(tx);
                inbox.push(rx);
            }
        }
        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outbox, inbox))| ChannelComm {
                rank,
                size,
                outbox,
                inbox,
            })
            .collect()
    }

    fn post(&self, destination: usize, packet: Packet) -> Result<()> {
        self.outbox
            .get(destination)
            .ok_or_else(|| Error::Communication(format!("No process {destination}")))?
            .send(packet)
            .map_err(|_| Error::Communication(format!("Process {destination} hung up")))
    }

    fn fetch(&self, source: usize) -> Result<Packet> {
        self.inbox
            .get(source)
            .ok_or_else(|| Error::Communication(format!("No process {source}")))?
            .recv()
            .map_err(|_| Error::Communication(format!("Process {source} hung up")))
    }

    fn unexpected(&self, source: usize, expected: &str, packet: &Packet) -> Error {
        Error::Communication(format!(
            "Process {} expected a {expected} message from {source} but got a {} message",
            self.rank,
            packet.kind()
        ))
    }
}

impl Communicator for ChannelComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()> {
        let master = self.master_rank();
        if self.rank == master {
            for source in (0..self.size).filter(|r| *r != master) {
                match self.fetch(source)? {
                    Packet::Reduce(contribution) if contribution.len() == values.len() => {
                        for (v, c) in values.iter_mut().zip(contribution) {
                            *v += c;
                        }
                    }
                    packet => return Err(self.unexpected(source, "reduction", &packet)),
                }
            }
            for destination in (0..self.size).filter(|r| *r != master) {
                self.post(destination, Packet::Reduce(values.to_vec()))?;
            }
        } else {
            self.post(master, Packet::Reduce(values.to_vec()))?;
            match self.fetch(master)? {
                Packet::Reduce(total) if total.len() == values.len() => values.copy_from_slice(&total),
                packet => return Err(self.unexpected(master, "reduction", &packet)),
            }
        }
        Ok(())
    }

    fn send_bytes(&self, destination: usize, bytes: Vec<u8>) -> Result<()> {
        self.post(destination, Packet::Data(bytes))
    }

    fn receive_bytes(&self, source: usize) -> Result<Vec<u8>> {
        match self.fetch(source)? {
            Packet::Data(bytes) => Ok(bytes),
            packet => Err(self.unexpected(source, "data", &packet)),
        }
    }

    fn barrier(&self) -> Result<()> {
        let master = self.master_rank();
        if self.rank == master {
            for source in (0..self.size).filter(|r| *r != master) {
                match self.fetch(source)? {
                    Packet::Barrier => {}
                    packet => return Err(self.unexpected(source, "barrier", &packet)),
                }
            }
            for destination in (0..self.size).filter(|r| *r != master) {
                self.post(destination, Packet::Barrier)?;
            }
            Ok(())
        } else {
            self.post(master, Packet::Barrier)?;
            match self.fetch(master)? {
                Packet::Barrier => Ok(()),
                packet => Err(self.unexpected(master, "barrier", &packet)),
            }
        }
    }
}
