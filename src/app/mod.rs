//! App runtime: wire the configured transports to one processor and run them.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{Config, QueueBackend};
use crate::errors::ReceiverError;
use crate::ingest::QueueClient;
use crate::pool::WorkerPool;
use crate::processor::Processor;
use crate::redis::{create_redis_pool, RedisStreamQueue};
use crate::sqs::{create_sqs_client_from_env, SqsQueue};
use crate::{http, lambda};

pub mod shutdown;

/// Run until a shutdown signal arrives (or, in Lambda mode, until the
/// runtime stops). Initialization failures are returned; per-event failures
/// never are.
pub async fn run(cfg: Arc<Config>, processor: Arc<dyn Processor>) -> Result<(), ReceiverError> {
    if cfg.lambda_mode {
        info!("running as lambda handler");
        return lambda::run_lambda(processor).await;
    }

    run_until(cfg, processor, shutdown::signal_token()).await
}

/// Same as `run` with an explicit token instead of OS signals.
pub async fn run_until(
    cfg: Arc<Config>,
    processor: Arc<dyn Processor>,
    shutdown: CancellationToken,
) -> Result<(), ReceiverError> {
    if cfg.backend == QueueBackend::None && cfg.http_bind_addr.is_none() {
        return Err(ReceiverError::Config(
            "nothing to run: set QUEUE_BACKEND or HTTP_BIND_ADDR".into(),
        ));
    }

    let mut tasks: JoinSet<Result<(), ReceiverError>> = JoinSet::new();

    if let Some(addr) = cfg.http_bind_addr {
        let router = http::router_with_limit(processor.clone(), cfg.http_body_limit);
        tasks.spawn(http::serve(addr, router, shutdown.clone()));
    }

    match cfg.backend {
        QueueBackend::Sqs => {
            let client =
                create_sqs_client_from_env(&cfg.aws_region, cfg.aws_endpoint_url.as_deref()).await;
            spawn_pool(&mut tasks, &cfg, SqsQueue::new(client), processor, &shutdown)?;
        }
        QueueBackend::Redis => {
            let url = cfg
                .redis_url
                .as_deref()
                .ok_or_else(|| ReceiverError::Config("REDIS_URL is not set".into()))?;
            let queue = RedisStreamQueue::new(
                create_redis_pool(url)?,
                &cfg.redis_group,
                &cfg.redis_consumer,
            )
            .with_claim_idle(cfg.redis_claim_idle);
            let pool_cfg = cfg.pool_config()?;
            queue.ensure_stream_group(pool_cfg.queue_identifier()).await?;
            spawn_pool(&mut tasks, &cfg, queue, processor, &shutdown)?;
        }
        QueueBackend::None => {}
    }

    // First failure stops everything else; the rest drain on the token.
    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(r) => r,
            Err(e) => Err(ReceiverError::Unknown(Box::new(e))),
        };
        if let Err(e) = outcome {
            error!(error = %e, "transport stopped with error");
            shutdown.cancel();
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    result
}

fn spawn_pool<Q: QueueClient>(
    tasks: &mut JoinSet<Result<(), ReceiverError>>,
    cfg: &Config,
    queue: Q,
    processor: Arc<dyn Processor>,
    shutdown: &CancellationToken,
) -> Result<(), ReceiverError> {
    let pool = WorkerPool::new(Arc::new(queue), processor, cfg.pool_config()?);
    let shutdown = shutdown.clone();
    tasks.spawn(async move {
        pool.run(shutdown).await;
        Ok(())
    });
    Ok(())
}
