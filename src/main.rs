// src/main.rs
use anyhow::{Context, Result};
use servicebus_emulator_demo::{
    admin::EmulatorAdminClient,
    config::{self, EmulatorConfig},
    health::{HealthError, HealthProber},
    messaging::AmqpMessaging,
    workflow::{EntityName, QueueWorkflow, TopicWorkflow, WorkflowError},
};
use std::process::ExitCode;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

enum Outcome {
    Completed,
    Interrupted,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("failed to initialise logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => ExitCode::from(130),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("servicebus_emulator_demo=info".parse()?)
                .add_directive("hyper=info".parse()?)
                .add_directive("fe2o3_amqp=warn".parse()?),
        )
        .init();
    Ok(())
}

async fn run() -> Result<Outcome> {
    let config = config::load_config()?;
    info!("Runtime ConnectionString: {}", config.connection_string());
    info!("Admin API ConnectionString: {}", config.admin_connection_string());

    // One listener for the whole run so a signal is never missed between
    // stages.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let prober = HealthProber::from_config(&config)?;
    tokio::select! {
        result = wait_for_emulator(&prober, &config) => {
            result?;
        }
        _ = interrupted(shutdown_rx.clone()) => {
            warn!("Interrupted while waiting for the emulator at {}", prober.url());
            return Ok(Outcome::Interrupted);
        }
    }

    let admin = EmulatorAdminClient::for_emulator(
        &config.admin_connection_string(),
        config.operation_timeout,
    )
    .context("failed to create admin client")?;

    let runtime_connection = config.connection_string();
    let connect = || {
        AmqpMessaging::connect(
            &runtime_connection,
            config.amqp_port,
            config.operation_timeout,
        )
    };

    let queue_workflow = QueueWorkflow::new(EntityName::queue(), config.receive_timeout)
        .with_close_timeout(config.close_timeout);
    let report = match queue_workflow
        .run_until(&admin, connect, interrupted(shutdown_rx.clone()))
        .await
    {
        Ok(report) => report,
        Err(WorkflowError::Interrupted) => return Ok(Outcome::Interrupted),
        Err(e) => return Err(e.into()),
    };
    info!(
        queue = %report.queue,
        received = report.received.len(),
        completed = report.completed,
        queue_deleted = report.queue_deleted,
        "Queue run finished"
    );

    let topic_workflow = TopicWorkflow::demo(config.subscription_receive_timeout)
        .with_close_timeout(config.close_timeout);
    let report = match topic_workflow
        .run_until(&admin, connect, interrupted(shutdown_rx))
        .await
    {
        Ok(report) => report,
        Err(WorkflowError::Interrupted) => return Ok(Outcome::Interrupted),
        Err(e) => return Err(e.into()),
    };
    for delivery in &report.deliveries {
        info!(
            subscription = %delivery.subscription,
            received = delivery.received.len(),
            completed = delivery.completed,
            "Subscription drained"
        );
    }
    info!(
        topic = %report.topic,
        sent = report.sent,
        teardown_complete = report.teardown_complete,
        "Topic run finished"
    );

    Ok(Outcome::Completed)
}

/// Resolves once the shutdown flag is raised.
async fn interrupted(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_emulator(prober: &HealthProber, config: &EmulatorConfig) -> Result<u32, HealthError> {
    match config.health_deadline {
        Some(deadline) => prober.wait_until_healthy_within(deadline).await,
        None => Ok(prober.wait_until_healthy().await),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
