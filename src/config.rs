//! Controller configuration
//!
//! Every environment-derived setting is parsed once at startup by clap into
//! [`ControllerArgs`] and frozen into a [`ControllerConfig`] that is handed
//! to the synthesizers and the culler through the controller context.

use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};

/// Default cluster DNS suffix
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
/// Default Istio gateway for VirtualServices
pub const DEFAULT_ISTIO_GATEWAY: &str = "kubeflow/kubeflow-gateway";
/// Default ingress class
pub const DEFAULT_INGRESS_CLASS: &str = "tmax-cloud";
/// Default cert-manager ClusterIssuer
pub const DEFAULT_CLUSTER_ISSUER: &str = "tmaxcloud-issuer";
/// Default DNS name requested on notebook certificates
pub const DEFAULT_CERTIFICATE_DNS_NAME: &str = "tmax-cloud";
/// Default idle time before a notebook is culled, in minutes (one day)
pub const DEFAULT_CULL_IDLE_MINUTES: u64 = 1440;
/// Default idleness re-check period, in minutes
pub const DEFAULT_IDLENESS_CHECK_MINUTES: u64 = 1;

/// Command line / environment surface of the controller
#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Base domain for notebook ingress hosts (`<name>-<namespace>.<domain>`)
    #[arg(long, env = "CUSTOM_DOMAIN", default_value = "")]
    pub custom_domain: String,

    /// Cluster DNS suffix used for in-cluster service hosts
    #[arg(long, env = "CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// OIDC client secret passed to the gatekeeper side-car
    #[arg(long, env = "CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    /// OIDC discovery URL passed to the gatekeeper side-car
    #[arg(long, env = "DISCOVERY_URL", default_value = "")]
    pub discovery_url: String,

    /// Gatekeeper image tag
    #[arg(long, env = "GATEKEEPER_VERSION", default_value = "latest")]
    pub gatekeeper_version: String,

    /// Gatekeeper log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub gatekeeper_log_level: String,

    /// Closed-network install: prefix images with the private registry
    #[arg(long, env = "IS_CLOSED", default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub is_closed: bool,

    /// Private registry prefix used when `IS_CLOSED` is set
    #[arg(long, env = "REGISTRY_NAME", default_value = "")]
    pub registry_name: String,

    /// Manage an Istio VirtualService per notebook
    #[arg(long, env = "USE_ISTIO", default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub use_istio: bool,

    /// Istio gateway the VirtualServices attach to
    #[arg(long, env = "ISTIO_GATEWAY", default_value = DEFAULT_ISTIO_GATEWAY)]
    pub istio_gateway: String,

    /// Add `fsGroup: 100` to pods without a security context
    #[arg(long, env = "ADD_FSGROUP", default_value = "true", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub add_fsgroup: bool,

    /// Ingress class for notebook ingresses
    #[arg(long, env = "INGRESS_CLASS", default_value = DEFAULT_INGRESS_CLASS)]
    pub ingress_class: String,

    /// cert-manager ClusterIssuer for notebook certificates
    #[arg(long, env = "CLUSTER_ISSUER", default_value = DEFAULT_CLUSTER_ISSUER)]
    pub cluster_issuer: String,

    /// DNS names requested on notebook certificates
    #[arg(
        long,
        env = "CERTIFICATE_DNS_NAMES",
        value_delimiter = ',',
        default_value = DEFAULT_CERTIFICATE_DNS_NAME
    )]
    pub certificate_dns_names: Vec<String>,

    /// Scale idle notebooks to zero
    #[arg(long, env = "ENABLE_CULLING", default_value = "false", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub enable_culling: bool,

    /// Minutes without activity before a notebook is culled
    #[arg(
        long,
        env = "CULL_IDLE_TIME",
        default_value_t = DEFAULT_CULL_IDLE_MINUTES,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub cull_idle_time: u64,

    /// Minutes between idleness checks
    #[arg(
        long,
        env = "IDLENESS_CHECK_PERIOD",
        default_value_t = DEFAULT_IDLENESS_CHECK_MINUTES,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub idleness_check_period: u64,
}

/// Settings for the gatekeeper side-car injected into every notebook pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatekeeperConfig {
    /// OIDC client secret
    pub client_secret: String,
    /// OIDC discovery URL
    pub discovery_url: String,
    /// Image tag
    pub version: String,
    /// Log level
    pub log_level: String,
    /// Registry prefix, present only for closed-network installs
    pub registry: Option<String>,
}

impl GatekeeperConfig {
    /// Fully qualified gatekeeper image
    pub fn image(&self) -> String {
        format!(
            "{}docker.io/tmaxcloudck/gatekeeper:{}",
            self.registry.as_deref().unwrap_or_default(),
            self.version
        )
    }
}

/// Idle-culling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullingConfig {
    /// Whether culling is active at all
    pub enabled: bool,
    /// Idle time after which a notebook is culled
    pub idle_time: Duration,
    /// Period between idleness re-checks
    pub check_period: Duration,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_time: Duration::from_secs(DEFAULT_CULL_IDLE_MINUTES * 60),
            check_period: Duration::from_secs(DEFAULT_IDLENESS_CHECK_MINUTES * 60),
        }
    }
}

/// Istio integration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IstioConfig {
    /// Gateway VirtualServices attach to
    pub gateway: String,
}

/// Immutable controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Base domain for ingress hosts
    pub custom_domain: String,
    /// Cluster DNS suffix
    pub cluster_domain: String,
    /// Gatekeeper side-car settings
    pub gatekeeper: GatekeeperConfig,
    /// Istio settings, present only when VirtualServices are managed
    pub istio: Option<IstioConfig>,
    /// Add the default fsGroup to pods without a security context
    pub add_fsgroup: bool,
    /// Ingress class
    pub ingress_class: String,
    /// cert-manager ClusterIssuer
    pub cluster_issuer: String,
    /// Certificate DNS names
    pub certificate_dns_names: Vec<String>,
    /// Culling policy
    pub culling: CullingConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            custom_domain: String::new(),
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            gatekeeper: GatekeeperConfig {
                client_secret: String::new(),
                discovery_url: String::new(),
                version: "latest".to_string(),
                log_level: "info".to_string(),
                registry: None,
            },
            istio: None,
            add_fsgroup: true,
            ingress_class: DEFAULT_INGRESS_CLASS.to_string(),
            cluster_issuer: DEFAULT_CLUSTER_ISSUER.to_string(),
            certificate_dns_names: vec![DEFAULT_CERTIFICATE_DNS_NAME.to_string()],
            culling: CullingConfig::default(),
        }
    }
}

impl From<ControllerArgs> for ControllerConfig {
    fn from(args: ControllerArgs) -> Self {
        let registry = args.is_closed.then_some(args.registry_name);
        let istio = args.use_istio.then(|| IstioConfig {
            gateway: args.istio_gateway,
        });
        let certificate_dns_names = args
            .certificate_dns_names
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            custom_domain: args.custom_domain,
            cluster_domain: args.cluster_domain,
            gatekeeper: GatekeeperConfig {
                client_secret: args.client_secret,
                discovery_url: args.discovery_url,
                version: args.gatekeeper_version,
                log_level: args.gatekeeper_log_level,
                registry,
            },
            istio,
            add_fsgroup: args.add_fsgroup,
            ingress_class: args.ingress_class,
            cluster_issuer: args.cluster_issuer,
            certificate_dns_names,
            culling: CullingConfig {
                enabled: args.enable_culling,
                idle_time: Duration::from_secs(args.cull_idle_time.saturating_mul(60)),
                check_period: Duration::from_secs(args.idleness_check_period.saturating_mul(60)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        args: ControllerArgs,
    }

    fn parse(argv: &[&str]) -> ControllerConfig {
        let mut full = vec!["notebook-controller"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().args.into()
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--custom-domain",
            "tmaxcloud.org",
            "--use-istio",
            "true",
            "--enable-culling",
            "true",
            "--cull-idle-time",
            "30",
            "--idleness-check-period",
            "5",
        ]);
        assert_eq!(config.custom_domain, "tmaxcloud.org");
        assert_eq!(
            config.istio.as_ref().map(|i| i.gateway.as_str()),
            Some(DEFAULT_ISTIO_GATEWAY)
        );
        assert!(config.culling.enabled);
        assert_eq!(config.culling.idle_time, Duration::from_secs(30 * 60));
        assert_eq!(config.culling.check_period, Duration::from_secs(5 * 60));
    }

    #[test]
    fn closed_network_prefixes_gatekeeper_image() {
        let config = parse(&[
            "--is-closed",
            "true",
            "--registry-name",
            "registry.local:5000/",
            "--gatekeeper-version",
            "10.0.0",
        ]);
        assert_eq!(
            config.gatekeeper.image(),
            "registry.local:5000/docker.io/tmaxcloudck/gatekeeper:10.0.0"
        );
    }

    #[test]
    fn open_network_ignores_registry_name() {
        let config = parse(&["--registry-name", "registry.local/", "--gatekeeper-version", "10.0.0"]);
        assert_eq!(config.gatekeeper.image(), "docker.io/tmaxcloudck/gatekeeper:10.0.0");
    }

    #[test]
    fn certificate_dns_names_are_comma_separated() {
        let config = parse(&["--certificate-dns-names", "tmax-cloud, notebooks.local"]);
        assert_eq!(
            config.certificate_dns_names,
            vec!["tmax-cloud".to_string(), "notebooks.local".to_string()]
        );
    }

    /// Story: a zero check period would requeue every notebook with a pod
    /// immediately, forever; it is refused at startup
    #[test]
    fn story_zero_minute_periods_are_rejected() {
        for flag in ["--idleness-check-period", "--cull-idle-time"] {
            let err = TestCli::try_parse_from(["notebook-controller", flag, "0"]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
        assert!(TestCli::try_parse_from(["notebook-controller", "--idleness-check-period", "1"]).is_ok());
    }

    #[test]
    fn fsgroup_can_be_opted_out() {
        assert!(!parse(&["--add-fsgroup", "false"]).add_fsgroup);
    }

    #[test]
    fn defaults_match_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.cluster_domain, "cluster.local");
        assert_eq!(config.ingress_class, "tmax-cloud");
        assert_eq!(config.cluster_issuer, "tmaxcloud-issuer");
        assert!(config.add_fsgroup);
        assert!(!config.culling.enabled);
        assert_eq!(config.culling.idle_time, Duration::from_secs(86_400));
    }
}
