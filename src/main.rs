//! Notebook controller binary

use clap::Parser;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

use notebook_controller::config::{ControllerArgs, ControllerConfig};
use notebook_controller::controller::{build_controllers, FIELD_MANAGER};
use notebook_controller::crd::Notebook;
use notebook_controller::telemetry::{init_telemetry, TelemetryConfig};

/// Notebook controller - runs Jupyter notebooks declared as `Notebook` resources
#[derive(Parser, Debug)]
#[command(name = "notebook-controller", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    controller: ControllerArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Notebook::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig::from_env("notebook-controller"))?;
    run_controller(cli.controller.into()).await
}

/// Run the Notebook controller until a shutdown signal arrives
async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    tracing::info!(
        culling = config.culling.enabled,
        istio = config.istio.is_some(),
        "Starting notebook controller"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    tracing::info!("Starting controllers...");
    // The event relay never ends on its own; stop once the controller has shut down
    futures::future::select_all(build_controllers(client, config)).await;

    tracing::info!("Notebook controller shutting down");
    Ok(())
}

/// Install or update the Notebook CRD with server-side apply
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing Notebook CRD...");
    crds.patch(Notebook::crd_name(), &params, &Patch::Apply(&Notebook::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install Notebook CRD: {}", e))?;

    Ok(())
}
