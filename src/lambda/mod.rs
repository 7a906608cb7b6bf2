//! AWS Lambda boundary (SQS event source mapping).
//!
//! One invocation carries a batch of records. Records are processed in order
//! and the first failure fails the whole invocation, so Lambda makes the
//! entire batch visible again. There is no partial batch acknowledgment.

use std::sync::Arc;

use aws_lambda_events::event::sqs::SqsEvent;
use bytes::Bytes;
use lambda_runtime::{service_fn, LambdaEvent};
use tracing::{info, warn};

use crate::errors::ReceiverError;
use crate::processor::Processor;

/// Process every record of `event` sequentially. A record without a body is
/// processed as an empty payload.
pub async fn handle_sqs_event<P>(processor: &P, event: SqsEvent) -> Result<(), ReceiverError>
where
    P: Processor + ?Sized,
{
    let total = event.records.len();
    for (index, record) in event.records.into_iter().enumerate() {
        let body = Bytes::from(record.body.unwrap_or_default());
        if let Err(source) = processor.process(body).await {
            warn!(
                index,
                total,
                message_id = ?record.message_id,
                error = %source,
                "record failed; failing batch"
            );
            return Err(ReceiverError::BatchRecord { index, source });
        }
    }
    info!(count = total, "batch processed");
    Ok(())
}

/// Hand control to the Lambda runtime; returns only when the runtime stops.
pub async fn run_lambda(processor: Arc<dyn Processor>) -> Result<(), ReceiverError> {
    lambda_runtime::run(service_fn(move |event: LambdaEvent<SqsEvent>| {
        let processor = processor.clone();
        async move {
            handle_sqs_event(&*processor, event.payload)
                .await
                .map_err(lambda_runtime::Error::from)
        }
    }))
    .await
    .map_err(|e| ReceiverError::Lambda(e.to_string()))
}
