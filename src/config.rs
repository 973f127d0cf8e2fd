use crate::application::dns_publisher::FleetNames;
use crate::domain::value_objects::{subdomain_to_fqdn, ZoneName};
use crate::error::{NlbError, Result};
use crate::infrastructure::HealthCheckConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Identity
    pub cluster: String,
    pub region: String,
    pub bootstrap_dir: String,
    pub debug: bool,

    // Backend directory builder
    pub config_path: String,
    pub reload_command: String,
    pub platform_api: String,

    // Proxy fleet
    pub auto_scaling_group: Option<String>,

    // DNS publication
    pub dns_domain: Option<String>,
    pub dns_zone: Option<String>,
    pub fleet_subdomain: String,
    pub private_subdomain: String,
    pub service_aliases: Vec<String>,
    pub dns_ttl_secs: u32,

    // Health gate
    pub health_port: u16,
    pub health_path: String,
    pub health_interval_secs: u64,
    pub health_timeout_ms: u64,
    pub healthy_threshold: u32,
    pub heartbeat_interval_secs: u64,

    // Command fan-out
    pub command_poll_ms: u64,
    pub fanout_limit: usize,

    // Invocation deadlines
    pub task_change_timeout_secs: u64,
    pub launch_timeout_secs: u64,
    pub terminate_timeout_secs: u64,

    // Servers
    pub agent_listen_addr: String,
    pub agent_port: u16,
    pub events_listen_addr: String,
    pub dns_listen_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            region: String::new(),
            bootstrap_dir: "/etc".to_string(),
            debug: false,
            config_path: "/etc/nginx/nlb.d/nlb.conf".to_string(),
            reload_command: "systemctl reload nginx".to_string(),
            platform_api: "http://127.0.0.1:8700".to_string(),
            auto_scaling_group: None,
            dns_domain: None,
            dns_zone: None,
            fleet_subdomain: "nlb.aws".to_string(),
            private_subdomain: "nlb-internal.aws".to_string(),
            service_aliases: Vec::new(),
            dns_ttl_secs: 60,
            health_port: 80,
            health_path: "/healthz".to_string(),
            health_interval_secs: 10,
            health_timeout_ms: 1000,
            healthy_threshold: 1,
            heartbeat_interval_secs: 60,
            command_poll_ms: 1000,
            fanout_limit: 8,
            task_change_timeout_secs: 60,
            launch_timeout_secs: 180,
            terminate_timeout_secs: 30,
            agent_listen_addr: "0.0.0.0:8710".to_string(),
            agent_port: 8710,
            events_listen_addr: "0.0.0.0:8711".to_string(),
            dns_listen_addr: "0.0.0.0:5353".to_string(),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    /// Build a configuration from a key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();

        Self {
            cluster: non_empty(lookup("NLB_CLUSTER")).unwrap_or(d.cluster),
            region: non_empty(lookup("NLB_REGION")).unwrap_or(d.region),
            bootstrap_dir: non_empty(lookup("NLB_BOOTSTRAP_DIR")).unwrap_or(d.bootstrap_dir),
            debug: lookup("DEBUG").is_some(),

            config_path: non_empty(lookup("NLB_CONFIG_PATH")).unwrap_or(d.config_path),
            reload_command: non_empty(lookup("NLB_RELOAD_COMMAND")).unwrap_or(d.reload_command),
            platform_api: non_empty(lookup("NLB_PLATFORM_API")).unwrap_or(d.platform_api),

            auto_scaling_group: non_empty(lookup("NLB_AUTO_SCALING_GROUP")),

            dns_domain: non_empty(lookup("NLB_DNS_DOMAIN")),
            dns_zone: non_empty(lookup("NLB_DNS_ZONE")),
            fleet_subdomain: non_empty(lookup("NLB_FLEET_SUBDOMAIN")).unwrap_or(d.fleet_subdomain),
            private_subdomain: non_empty(lookup("NLB_PRIVATE_SUBDOMAIN"))
                .unwrap_or(d.private_subdomain),
            service_aliases: lookup("NLB_SERVICE_ALIASES")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            dns_ttl_secs: parse_or(lookup("NLB_DNS_TTL_SECS"), d.dns_ttl_secs),

            health_port: parse_or(lookup("NLB_HEALTH_PORT"), d.health_port),
            health_path: non_empty(lookup("NLB_HEALTH_PATH")).unwrap_or(d.health_path),
            health_interval_secs: parse_or(lookup("NLB_HEALTH_INTERVAL_SECS"), d.health_interval_secs),
            health_timeout_ms: parse_or(lookup("NLB_HEALTH_TIMEOUT_MS"), d.health_timeout_ms),
            healthy_threshold: parse_or(lookup("NLB_HEALTHY_THRESHOLD"), d.healthy_threshold),
            heartbeat_interval_secs: parse_or(
                lookup("NLB_HEARTBEAT_INTERVAL_SECS"),
                d.heartbeat_interval_secs,
            ),

            command_poll_ms: parse_or(lookup("NLB_COMMAND_POLL_MS"), d.command_poll_ms),
            fanout_limit: parse_or(lookup("NLB_FANOUT_LIMIT"), d.fanout_limit),

            task_change_timeout_secs: parse_or(
                lookup("NLB_TASK_CHANGE_TIMEOUT_SECS"),
                d.task_change_timeout_secs,
            ),
            launch_timeout_secs: parse_or(lookup("NLB_LAUNCH_TIMEOUT_SECS"), d.launch_timeout_secs),
            terminate_timeout_secs: parse_or(
                lookup("NLB_TERMINATE_TIMEOUT_SECS"),
                d.terminate_timeout_secs,
            ),

            agent_listen_addr: non_empty(lookup("NLB_AGENT_LISTEN_ADDR")).unwrap_or(d.agent_listen_addr),
            agent_port: parse_or(lookup("NLB_AGENT_PORT"), d.agent_port),
            events_listen_addr: non_empty(lookup("NLB_EVENTS_LISTEN_ADDR"))
                .unwrap_or(d.events_listen_addr),
            dns_listen_addr: non_empty(lookup("NLB_DNS_LISTEN_ADDR")).unwrap_or(d.dns_listen_addr),
        }
    }

    /// Fill cluster and region from the node bootstrap files when unset.
    pub fn with_bootstrap_files(mut self) -> Self {
        let dir = PathBuf::from(&self.bootstrap_dir);
        if self.cluster.is_empty() {
            if let Some(cluster) = read_bootstrap_file(&dir.join(".cluster")) {
                self.cluster = cluster;
            }
        }
        if self.region.is_empty() {
            if let Some(region) = read_bootstrap_file(&dir.join(".region")) {
                self.region = region;
            }
        }
        self
    }

    /// Hosted zone the fleet is published in.
    pub fn zone(&self) -> Option<ZoneName> {
        self.dns_zone
            .as_deref()
            .or(self.dns_domain.as_deref())
            .map(ZoneName::new)
    }

    pub fn fleet_names(&self) -> Option<FleetNames> {
        let domain = self.dns_domain.as_deref()?;
        Some(FleetNames {
            public: subdomain_to_fqdn(&self.fleet_subdomain, domain),
            private: subdomain_to_fqdn(&self.private_subdomain, domain),
        })
    }

    /// Fully-qualified alias names for the configured subdomains plus `extra`.
    pub fn alias_names<'a, I>(&'a self, extra: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Some(domain) = self.dns_domain.as_deref() else {
            return Vec::new();
        };

        let mut names: Vec<String> = self
            .service_aliases
            .iter()
            .map(String::as_str)
            .chain(extra)
            .map(|sub| subdomain_to_fqdn(sub, domain))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Reject names the hosted zone cannot carry.
    pub fn validate(&self) -> Result<()> {
        if self.fanout_limit == 0 {
            return Err(NlbError::Config("NLB_FANOUT_LIMIT must be at least 1".to_string()));
        }

        let (Some(domain), Some(zone)) = (self.dns_domain.as_deref(), self.zone()) else {
            return Ok(());
        };

        if !zone.contains(domain) {
            return Err(NlbError::Config(format!(
                "domain {} is not inside zone {}",
                domain, zone
            )));
        }

        if let Some(names) = self.fleet_names() {
            for name in [&names.public, &names.private] {
                if !zone.contains(name) {
                    return Err(NlbError::Config(format!(
                        "fleet name {} is not inside zone {}",
                        name, zone
                    )));
                }
            }
        }

        for alias in self.alias_names([]) {
            if !zone.contains(&alias) {
                return Err(NlbError::Config(format!(
                    "alias {} is not inside zone {}",
                    alias, zone
                )));
            }
        }

        Ok(())
    }

    pub fn health_check_config(&self) -> HealthCheckConfig {
        HealthCheckConfig {
            interval: Duration::from_secs(self.health_interval_secs),
            healthy_threshold: self.healthy_threshold,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
        }
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn command_poll_interval(&self) -> Duration {
        Duration::from_millis(self.command_poll_ms)
    }

    pub fn task_change_timeout(&self) -> Duration {
        Duration::from_secs(self.task_change_timeout_secs)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }
}

fn read_bootstrap_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => non_empty(Some(contents)),
        Err(e) => {
            tracing::debug!("bootstrap file {} not readable: {}", path.display(), e);
            None
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    let cfg = Config::from_lookup(|key| std::env::var(key).ok()).with_bootstrap_files();
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ===== Defaults =====

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.config_path, "/etc/nginx/nlb.d/nlb.conf");
        assert_eq!(cfg.dns_ttl_secs, 60);
        assert_eq!(cfg.health_port, 80);
        assert_eq!(cfg.fanout_limit, 8);
        assert!(cfg.dns_domain.is_none());
        assert!(!cfg.debug);
    }

    #[test]
    fn test_from_empty_lookup_matches_default() {
        let cfg = Config::from_lookup(|_| None);
        let d = Config::default();
        assert_eq!(cfg.config_path, d.config_path);
        assert_eq!(cfg.agent_listen_addr, d.agent_listen_addr);
        assert_eq!(cfg.launch_timeout_secs, 180);
        assert!(cfg.service_aliases.is_empty());
    }

    // ===== Parsing =====

    #[test]
    fn test_from_lookup_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("NLB_CLUSTER", "main"),
            ("NLB_AUTO_SCALING_GROUP", "nlb-asg"),
            ("NLB_DNS_DOMAIN", "example.org"),
            ("NLB_SERVICE_ALIASES", "content, game ,,"),
            ("NLB_HEALTHY_THRESHOLD", "3"),
            ("NLB_COMMAND_POLL_MS", "250"),
            ("DEBUG", "1"),
        ]));

        assert_eq!(cfg.cluster, "main");
        assert_eq!(cfg.auto_scaling_group.as_deref(), Some("nlb-asg"));
        assert_eq!(cfg.service_aliases, vec!["content", "game"]);
        assert_eq!(cfg.healthy_threshold, 3);
        assert_eq!(cfg.command_poll_interval(), Duration::from_millis(250));
        assert!(cfg.debug);
    }

    #[test]
    fn test_parse_error_uses_default() {
        let cfg = Config::from_lookup(lookup(&[("NLB_DNS_TTL_SECS", "not_a_number")]));
        assert_eq!(cfg.dns_ttl_secs, 60);
    }

    #[test]
    fn test_blank_value_uses_default() {
        let cfg = Config::from_lookup(lookup(&[("NLB_CONFIG_PATH", "  ")]));
        assert_eq!(cfg.config_path, "/etc/nginx/nlb.d/nlb.conf");
    }

    // ===== Bootstrap Files =====

    #[test]
    fn test_bootstrap_files_fill_identity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".cluster"), "main\n").unwrap();
        std::fs::write(dir.path().join(".region"), "eu-west-1\n").unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let cfg = Config::from_lookup(lookup(&[("NLB_BOOTSTRAP_DIR", dir_str.as_str())])).with_bootstrap_files();

        assert_eq!(cfg.cluster, "main");
        assert_eq!(cfg.region, "eu-west-1");
    }

    #[test]
    fn test_environment_wins_over_bootstrap_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".cluster"), "from-file").unwrap();
        let dir_str = dir.path().to_string_lossy().to_string();

        let cfg = Config::from_lookup(lookup(&[
            ("NLB_BOOTSTRAP_DIR", dir_str.as_str()),
            ("NLB_CLUSTER", "from-env"),
        ]))
        .with_bootstrap_files();

        assert_eq!(cfg.cluster, "from-env");
        assert!(cfg.region.is_empty());
    }

    // ===== DNS Names =====

    #[test]
    fn test_fleet_names() {
        let cfg = Config::from_lookup(lookup(&[("NLB_DNS_DOMAIN", "example.org.")]));
        let names = cfg.fleet_names().unwrap();
        assert_eq!(names.public, "nlb.aws.example.org");
        assert_eq!(names.private, "nlb-internal.aws.example.org");
    }

    #[test]
    fn test_alias_names_apex_and_dedup() {
        let cfg = Config::from_lookup(lookup(&[
            ("NLB_DNS_DOMAIN", "example.org"),
            ("NLB_SERVICE_ALIASES", "@,content"),
        ]));
        let names = cfg.alias_names(["content", "game"]);
        assert_eq!(
            names,
            vec!["content.example.org", "example.org", "game.example.org"]
        );
    }

    #[test]
    fn test_no_domain_means_no_names() {
        let cfg = Config::default();
        assert!(cfg.fleet_names().is_none());
        assert!(cfg.alias_names(["content"]).is_empty());
        assert!(cfg.validate().is_ok());
    }

    // ===== Validation =====

    #[test]
    fn test_validate_accepts_subdomain_of_zone() {
        let cfg = Config::from_lookup(lookup(&[
            ("NLB_DNS_DOMAIN", "game.example.org"),
            ("NLB_DNS_ZONE", "example.org"),
        ]));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_domain_outside_zone() {
        let cfg = Config::from_lookup(lookup(&[
            ("NLB_DNS_DOMAIN", "example.net"),
            ("NLB_DNS_ZONE", "example.org"),
        ]));
        assert!(matches!(cfg.validate(), Err(NlbError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_fanout() {
        let cfg = Config::from_lookup(lookup(&[("NLB_FANOUT_LIMIT", "0")]));
        assert!(cfg.validate().is_err());
    }
}
