//! Runtime configuration from environment variables.
//!
//! One image, three roles. The role decides which loop the process runs;
//! everything else (broker address, DB path, consumer id) is shared.

use anyhow::{bail, Result};
use std::str::FromStr;

const DEFAULT_AMQP_ADDR: &str = "amqp://127.0.0.1:5672/%2f";
const DEFAULT_DB_PATH: &str = "~/.ridematch/ridematch.db";
const DEFAULT_CONSUMER_ID: &str = "C1";

/// Which pipeline stage this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts ride requests and enqueues them
    Producer,
    /// Competing consumer on the request queue
    Matcher,
    /// Sole consumer on the result queue, writes to the database
    DbWriter,
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "producer" => Ok(Role::Producer),
            "matcher" => Ok(Role::Matcher),
            "db-writer" => Ok(Role::DbWriter),
            other => bail!("unknown RIDEMATCH_ROLE '{other}' (expected producer | matcher | db-writer)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub role: Role,
    /// Worker identity (C1..CN). Observability only, never routing.
    pub consumer_id: String,
    pub amqp_addr: String,
    pub db_path: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self> {
        let role: Role = match std::env::var("RIDEMATCH_ROLE") {
            Ok(value) => value.parse()?,
            Err(_) => bail!("RIDEMATCH_ROLE not set (expected producer | matcher | db-writer)"),
        };

        let consumer_id =
            std::env::var("CONSUMER_ID").unwrap_or_else(|_| DEFAULT_CONSUMER_ID.to_string());

        let amqp_addr =
            std::env::var("AMQP_ADDR").unwrap_or_else(|_| DEFAULT_AMQP_ADDR.to_string());

        let db_path = std::env::var("RIDEMATCH_DB_PATH")
            .unwrap_or_else(|_| shellexpand::tilde(DEFAULT_DB_PATH).into_owned());

        Ok(Self {
            role,
            consumer_id,
            amqp_addr,
            db_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_all_variants() {
        assert_eq!("producer".parse::<Role>().unwrap(), Role::Producer);
        assert_eq!("matcher".parse::<Role>().unwrap(), Role::Matcher);
        assert_eq!("db-writer".parse::<Role>().unwrap(), Role::DbWriter);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("db_writer".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }
}
