//! Configuration surface recognized by the core (spec §6), loaded the way
//! the teacher's `load_config` does: built-in defaults, merged with an
//! optional TOML file, merged with environment variables. Keys outside this
//! surface are parsed but ignored by the runtime.

use std::env;

use config::{Config, Environment, File};

/// Parsed, validated configuration for an `ActorSystem`.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub scheduler_max_threads: usize,
    pub scheduler_max_throughput: u32,
    pub aggressive_poll_attempts: u32,
    pub aggressive_steal_interval: u32,
    pub moderate_poll_attempts: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig::from_raw(&load_config())
    }
}

impl SystemConfig {
    /// Loads configuration from defaults, an optional TOML file and
    /// environment variables (see `load_config`).
    pub fn load() -> Self {
        SystemConfig::from_raw(&load_config())
    }

    fn from_raw(cfg: &Config) -> Self {
        SystemConfig {
            scheduler_max_threads: cfg.get_int("scheduler.max-threads").unwrap_or_else(|_| num_cpus::get() as i64) as usize,
            scheduler_max_throughput: cfg.get_int("scheduler.max-throughput").unwrap_or(9) as u32,
            aggressive_poll_attempts: cfg
                .get_int("work-stealing.aggressive-poll-attempts")
                .unwrap_or(2000) as u32,
            aggressive_steal_interval: cfg
                .get_int("work-stealing.aggressive-steal-interval")
                .unwrap_or(10) as u32,
            moderate_poll_attempts: cfg
                .get_int("work-stealing.moderate-poll-attempts")
                .unwrap_or(200) as u32,
        }
    }
}

/// Resolution order mirrors the teacher's `load_config`: built-in defaults,
/// then an optional file named by `NUCLEUS_CONF` (falling back to
/// `config/actor-rt.toml`), then environment variables prefixed
/// `NUCLEUS__` (double underscore as section separator).
pub fn load_config() -> Config {
    let mut builder = Config::builder()
        .set_default("scheduler.max-threads", num_cpus::get() as i64)
        .unwrap()
        .set_default("scheduler.max-throughput", 9)
        .unwrap()
        .set_default("work-stealing.aggressive-poll-attempts", 2000)
        .unwrap()
        .set_default("work-stealing.aggressive-steal-interval", 10)
        .unwrap()
        .set_default("work-stealing.moderate-poll-attempts", 200)
        .unwrap();

    let path = env::var("NUCLEUS_CONF").unwrap_or_else(|_| "config/actor-rt.toml".into());
    builder = builder.add_source(File::with_name(&path).required(false));
    builder = builder.add_source(Environment::with_prefix("NUCLEUS").separator("__"));

    builder.build().expect("configuration sources are well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SystemConfig::load();
        assert_eq!(cfg.scheduler_max_throughput, 9);
        assert_eq!(cfg.aggressive_poll_attempts, 2000);
        assert_eq!(cfg.aggressive_steal_interval, 10);
        assert_eq!(cfg.moderate_poll_attempts, 200);
        assert!(cfg.scheduler_max_threads >= 1);
    }

    #[test]
    fn honors_environment_override() {
        env::set_var("NUCLEUS__SCHEDULER__MAX-THROUGHPUT", "42");
        let cfg = SystemConfig::load();
        assert_eq!(cfg.scheduler_max_throughput, 42);
        env::remove_var("NUCLEUS__SCHEDULER__MAX-THROUGHPUT");
    }
}
