//! Single process communicator
use super::Communicator;
use crate::types::{Error, Result};

/// Communicator of a run on a single process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _values: &mut [f64]) -> Result<()> {
        Ok(())
    }

    fn send_bytes(&self, destination: usize, _bytes: Vec<u8>) -> Result<()> {
        Err(Error::Communication(format!(
            "Can not send to process {destination} from a single process run"
        )))
    }

    fn receive_bytes(&self, source: usize) -> Result<Vec<u8>> {
        Err(Error::Communication(format!(
            "Can not receive from process {source} in a single process run"
        )))
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }
}
