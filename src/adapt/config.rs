//! Adapter configuration.

use crate::algs::communicator::CommTag;
use crate::algs::exchange::ExchangeOptions;
use crate::amr_error::AmrError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings of one partition's [`MeshAdapter`](crate::adapt::MeshAdapter).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptConfig {
    /// This partition's rank.
    pub rank: usize,
    /// Number of partitions taking part in each cycle.
    pub num_partitions: usize,
    /// First id of the rank-strided split-node sequence. Required with more than
    /// one partition and identical on every rank.
    pub node_id_base: Option<u64>,
    /// Bound on local marking passes per exchange round.
    pub max_passes: usize,
    /// Bound on exchange rounds per marking stage.
    pub max_rounds: usize,
    pub exchange: ExchangeOptions,
    /// First of the four message tags the adapter uses.
    pub tag_base: CommTag,
    /// Validate the working mesh before voting to commit.
    pub check_conformity: bool,
}

impl Default for AdaptConfig {
    fn default() -> Self {
        Self {
            rank: 0,
            num_partitions: 1,
            node_id_base: None,
            max_passes: 256,
            max_rounds: 256,
            exchange: ExchangeOptions::default(),
            tag_base: 0x4100,
            check_conformity: true,
        }
    }
}

impl AdaptConfig {
    /// Configuration of `rank` out of `num_partitions`.
    pub fn partition(rank: usize, num_partitions: usize) -> Self {
        Self {
            rank,
            num_partitions,
            ..Self::default()
        }
    }

    pub fn with_node_id_base(mut self, base: u64) -> Self {
        self.node_id_base = Some(base);
        self
    }

    pub fn with_max_passes(mut self, passes: usize) -> Self {
        self.max_passes = passes;
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration, max_retries: u32) -> Self {
        self.exchange = ExchangeOptions {
            timeout,
            max_retries,
        };
        self
    }

    pub fn with_tag_base(mut self, tag_base: CommTag) -> Self {
        self.tag_base = tag_base;
        self
    }

    pub fn with_check_conformity(mut self, on: bool) -> Self {
        self.check_conformity = on;
        self
    }

    pub fn validate(&self) -> Result<(), AmrError> {
        if self.num_partitions == 0 {
            return Err(AmrError::Config("num_partitions must be positive".into()));
        }
        if self.rank >= self.num_partitions {
            return Err(AmrError::Config(format!(
                "rank {} outside {} partitions",
                self.rank, self.num_partitions
            )));
        }
        if self.num_partitions > 1 && self.node_id_base.is_none() {
            return Err(AmrError::Config(
                "node_id_base is required with more than one partition".into(),
            ));
        }
        if self.max_passes == 0 || self.max_rounds == 0 {
            return Err(AmrError::Config("max_passes and max_rounds must be positive".into()));
        }
        if self.tag_base.checked_add(3).is_none() {
            return Err(AmrError::Config(format!("tag_base {} too large", self.tag_base)));
        }
        Ok(())
    }
}
