//! Communication between the processes sharing a domain
//!
//! A communicator is created once per process and handed to every component
//! that has to talk to the other processes. Collective operations must be
//! called by every process, in the same order.
mod channel;
#[cfg(feature = "mpi")]
mod mpi_comm;
mod serial;

pub use channel::ChannelComm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
pub use serial::SerialComm;

use crate::partition::{slice_params, Slice};
use crate::types::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Capabilities needed to run a domain across several processes.
pub trait Communicator {
    /// Rank of this process
    fn rank(&self) -> usize;

    /// Number of processes
    fn size(&self) -> usize;

    /// Rank of the process doing the centralised I/O
    fn master_rank(&self) -> usize {
        0
    }

    /// Is this process the master?
    fn is_master(&self) -> bool {
        self.rank() == self.master_rank()
    }

    /// Sum `values` element-wise over all processes and store the result on all of them.
    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()>;

    /// Send a message to `destination`.
    fn send_bytes(&self, destination: usize, bytes: Vec<u8>) -> Result<()>;

    /// Receive the next message from `source`.
    fn receive_bytes(&self, source: usize) -> Result<Vec<u8>>;

    /// Wait until all processes reached the barrier.
    fn barrier(&self) -> Result<()>;

    /// The columns of a domain of width `total` handled by process `rank`.
    fn slice_of(&self, total: usize, rank: usize) -> Slice {
        slice_params(total, self.size(), rank)
    }

    /// The columns of a domain of width `total` handled by this process.
    fn local_slice(&self, total: usize) -> Slice {
        self.slice_of(total, self.rank())
    }
}

/// Send `value` to `destination`. The value is consumed.
pub fn send<C: Communicator + ?Sized, T: Serialize>(comm: &C, destination: usize, value: T) -> Result<()> {
    let bytes = serde_json::to_vec(&value)?;
    drop(value);
    comm.send_bytes(destination, bytes)
}

/// Receive a value sent with [send].
pub fn receive<C: Communicator + ?Sized, T: DeserializeOwned>(comm: &C, source: usize) -> Result<T> {
    let bytes = comm.receive_bytes(source)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Sum a count over all processes.
pub fn all_reduce_count<C: Communicator + ?Sized>(comm: &C, count: usize) -> Result<usize> {
    let mut buffer = [count as f64];
    comm.all_reduce_sum(&mut buffer)?;
    Ok(buffer[0].round() as usize)
}
