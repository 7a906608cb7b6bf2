use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use event_receiver::errors::ProcessError;
use event_receiver::http::router;
use event_receiver::processor::{Json, JsonProcessor, Processor};
use proptest::prelude::*;
use proptest::string::string_regex;
use serde::Deserialize;
use tower::ServiceExt;

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Bytes>>,
}

#[async_trait]
impl Processor for Recorder {
    async fn process(&self, event: Bytes) -> Result<(), ProcessError> {
        self.calls.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Deserialize)]
struct TestEvent {
    id: String,
}

#[derive(Default)]
struct Ids {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl JsonProcessor for Ids {
    type Event = TestEvent;

    async fn process_json(&self, event: TestEvent) -> Result<(), ProcessError> {
        self.seen.lock().unwrap().push(event.id);
        Ok(())
    }
}

// Identifiers with ASCII or general Unicode characters.
fn any_id() -> impl Strategy<Value = String> {
    let ascii = string_regex(r"[^\n]{0,256}").unwrap();
    let unicode = proptest::collection::vec(any::<char>(), 0..128)
        .prop_map(|v| v.into_iter().collect::<String>());
    prop_oneof![ascii, unicode]
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
        .block_on(fut)
}

proptest! {
  // Any body reaches a raw processor byte-for-byte, exactly once.
  #[test]
  fn raw_body_is_delivered_verbatim(buf in proptest::collection::vec(any::<u8>(), 0..4096)) {
      let recorder = Arc::new(Recorder::default());
      let payload = Bytes::from(buf);

      let status = block_on(async {
          let req = Request::builder().uri("/").body(Body::from(payload.clone())).unwrap();
          router(recorder.clone()).oneshot(req).await.unwrap().status()
      });

      prop_assert_eq!(status, StatusCode::OK);
      prop_assert_eq!(recorder.calls.lock().unwrap().clone(), vec![payload]);
  }

  // A JSON-mode processor sees the decoded value, not the encoded text.
  #[test]
  fn json_id_arrives_structurally(id in any_id()) {
      let ids = Arc::new(Json(Ids::default()));
      let body = serde_json::to_vec(&serde_json::json!({ "id": id })).expect("encode");

      let status = block_on(async {
          let req = Request::builder().uri("/").body(Body::from(body)).unwrap();
          router(ids.clone()).oneshot(req).await.unwrap().status()
      });

      prop_assert_eq!(status, StatusCode::OK);
      prop_assert_eq!(ids.0.seen.lock().unwrap().clone(), vec![id]);
  }
}
