//! MPI communicator
use super::Communicator;
use crate::types::{Error, Result};
use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as MpiCommunicator, CommunicatorCollectives, Destination, Source};

/// Communicator over `MPI_COMM_WORLD`.
///
/// MPI is initialised when the communicator is created and finalised when it
/// is dropped, so exactly one should exist per process.
pub struct MpiComm {
    // dropped before the universe
    world: SimpleCommunicator,
    _universe: Universe,
}

impl MpiComm {
    /// Initialise MPI and wrap the world communicator.
    pub fn initialize() -> Result<Self> {
        let universe = mpi::initialize()
            .ok_or_else(|| Error::Communication("MPI was already initialised".to_string()))?;
        let world = universe.world();
        Ok(Self {
            world,
            _universe: universe,
        })
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()> {
        let local = values.to_vec();
        self.world
            .all_reduce_into(&local[..], values, SystemOperation::sum());
        Ok(())
    }

    fn send_bytes(&self, destination: usize, bytes: Vec<u8>) -> Result<()> {
        self.world
            .process_at_rank(destination as i32)
            .send(&bytes[..]);
        Ok(())
    }

    fn receive_bytes(&self, source: usize) -> Result<Vec<u8>> {
        let (bytes, _status) = self
            .world
            .process_at_rank(source as i32)
            .receive_vec::<u8>();
        Ok(bytes)
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }
}
