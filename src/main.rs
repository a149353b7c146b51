use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marionette::controller::{Controller, ModuleSelector, StartOutcome, StartRequest};
use marionette::llm::LlmModuleFactory;
use marionette::message::Role;
use marionette::module::dummy::{DummyAsrFactory, DummyFrontendFactory};
use marionette::module::Registry;
use marionette::tts::TtsModuleFactory;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marionette=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut registry = Registry::new();
    registry.register(DummyAsrFactory)?;
    registry.register(DummyFrontendFactory)?;
    registry.register(LlmModuleFactory::default())?;
    registry.register(TtsModuleFactory::default())?;

    let controller = Controller::new(registry);
    info!(version = %controller.get_version().version, "starting orchestration core");

    let outcome = controller
        .start(StartRequest::new(vec![
            ModuleSelector::new(Role::Asr, "DummyAsr"),
            ModuleSelector::new(Role::Frontend, "DummyFrontend"),
            ModuleSelector::new(Role::Llm, "LlmModule"),
            ModuleSelector::new(Role::Tts, "TtsModule"),
        ]))
        .await;
    match outcome {
        StartOutcome::Ok => info!("reference module set running; press Ctrl+C to stop"),
        other => anyhow::bail!("failed to start reference module set: {other:?}"),
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    controller.stop().await;

    Ok(())
}
