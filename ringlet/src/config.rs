/// Configuration for the io_uring reactor.
#[derive(Clone)]
pub struct Config {
    /// Number of SQ entries. Must be a power of two.
    pub sq_entries: u32,
    /// Capacity of the user-data block pool. One block is held per in-flight
    /// operation (two for an operation with a deadline).
    pub user_data_slots: u32,
    /// Maximum queued submissions the driver prepares per wakeup before
    /// flushing the ring.
    pub submit_batch: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sq_entries: 128,
            user_data_slots: 128 * 1024,
            submit_batch: 64,
        }
    }
}

impl Config {
    /// Validate configuration values. Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.sq_entries == 0 || !self.sq_entries.is_power_of_two() {
            return Err(crate::error::Error::RingSetup(
                "sq_entries must be > 0 and a power of two".into(),
            ));
        }
        if self.user_data_slots == 0 {
            return Err(crate::error::Error::RingSetup(
                "user_data_slots must be > 0".into(),
            ));
        }
        if self.submit_batch == 0 {
            return Err(crate::error::Error::RingSetup(
                "submit_batch must be > 0".into(),
            ));
        }
        if self.submit_batch > self.sq_entries {
            return Err(crate::error::Error::RingSetup(
                "submit_batch must not exceed sq_entries".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_power_of_two_sq() {
        let config = Config {
            sq_entries: 100,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_pool() {
        let config = Config {
            user_data_slots: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_batch() {
        let config = Config {
            submit_batch: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_batch_larger_than_sq() {
        let config = Config {
            sq_entries: 64,
            submit_batch: 128,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
