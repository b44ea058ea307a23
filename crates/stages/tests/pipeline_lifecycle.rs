//! Lifecycle and message-flow tests for the six-stage pipeline.

use std::sync::Arc;
use std::time::Duration;

use ace_core::{
    Amendment, BackendError, CompletionRequest, ConfigValue, Envelope, ErrorKind, Flow, GatewaySettings,
    Money, Origin, PipelineSettings, ReasoningBackend, StageId,
};
use ace_stages::{
    Emit, Pipeline, PipelineBuilder, PipelineError, PipelineIo, ReasoningGateway, RelayBehavior,
    StageBehavior, StageContext, StageError, StageState,
};
use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn settings() -> PipelineSettings {
    PipelineSettings {
        queue_capacity: 8,
        poll_interval_ms: 10,
        ..PipelineSettings::default()
    }
}

fn relay_pipeline() -> (Pipeline, PipelineIo) {
    PipelineBuilder::new(settings())
        .default_behavior(Arc::new(RelayBehavior))
        .build()
        .unwrap()
}

async fn next(io: &mut ace_stages::Boundary) -> Envelope {
    timeout(WAIT, io.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("pipeline end closed")
}

async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Holds each item until released.
#[derive(Clone, Default)]
struct GatedBehavior {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl StageBehavior for GatedBehavior {
    async fn process(
        &self,
        _ctx: &StageContext,
        _envelope: Envelope,
        _flow: Flow,
    ) -> Result<Vec<Emit>, StageError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Vec::new())
    }
}

/// Emits several copies of every item in one fixed direction.
struct FanOutBehavior {
    toward: Flow,
    copies: usize,
}

#[async_trait]
impl StageBehavior for FanOutBehavior {
    async fn process(
        &self,
        _ctx: &StageContext,
        envelope: Envelope,
        _flow: Flow,
    ) -> Result<Vec<Emit>, StageError> {
        let text = envelope.text();
        Ok((0..self.copies)
            .map(|_| Emit::along(self.toward, text.clone()))
            .collect())
    }
}

struct FailingBehavior;

#[async_trait]
impl StageBehavior for FailingBehavior {
    async fn process(
        &self,
        _ctx: &StageContext,
        _envelope: Envelope,
        _flow: Flow,
    ) -> Result<Vec<Emit>, StageError> {
        Err(StageError::Behavior("cannot handle this".into()))
    }
}

struct PanickingBehavior;

#[async_trait]
impl StageBehavior for PanickingBehavior {
    async fn process(
        &self,
        _ctx: &StageContext,
        _envelope: Envelope,
        _flow: Flow,
    ) -> Result<Vec<Emit>, StageError> {
        panic!("behaviour exploded")
    }
}

/// Acknowledges the last message by its length.
struct EchoingBackend;

#[async_trait]
impl ReasoningBackend for EchoingBackend {
    fn name(&self) -> &str {
        "echoing"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let last = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(format!("ack: {}", last.len()))
    }
}

#[tokio::test]
async fn start_then_stop_with_no_items_reaches_stopped_everywhere() {
    let (pipeline, _io) = relay_pipeline();
    assert!(pipeline
        .states()
        .iter()
        .all(|(_, state)| *state == StageState::Idle));

    pipeline.start().unwrap();
    assert!(pipeline.is_running());
    pipeline.stop().await.unwrap();

    assert!(!pipeline.is_running());
    for stage in pipeline.stages() {
        assert_eq!(stage.state(), StageState::Stopped);
        let stats = stage.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.failed, 0);
    }
}

#[tokio::test]
async fn lifecycle_misuse_is_reported() {
    let (pipeline, _io) = relay_pipeline();

    assert!(matches!(pipeline.stop().await, Err(PipelineError::NotStarted)));

    pipeline.start().unwrap();
    assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStarted)));

    pipeline.stop().await.unwrap();
    assert!(matches!(pipeline.stop().await, Err(PipelineError::AlreadyStopped)));
    assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStopped)));
}

#[test]
fn start_outside_a_runtime_is_rejected() {
    let (pipeline, _io) = relay_pipeline();
    assert!(matches!(pipeline.start(), Err(PipelineError::NoRuntime)));
}

#[tokio::test]
async fn items_travel_the_whole_chain_in_order() {
    let (pipeline, mut io) = relay_pipeline();
    pipeline.start().unwrap();

    for item in ["x1", "x2", "x3"] {
        io.top.submit_payload(item).await.unwrap();
    }
    let mut seen = Vec::new();
    for _ in 0..3 {
        let envelope = next(&mut io.bottom).await;
        assert_eq!(envelope.origin, Origin::Stage(StageId::TaskProsecution));
        seen.push(envelope.text());
    }
    assert_eq!(seen, vec!["x1", "x2", "x3"]);

    io.bottom.submit_payload("telemetry").await.unwrap();
    let up = next(&mut io.top).await;
    assert_eq!(up.text(), "telemetry");
    assert_eq!(up.origin, Origin::Stage(StageId::Aspirational));

    pipeline.stop().await.unwrap();
    for stage in pipeline.stages() {
        assert_eq!(stage.stats().processed, 4);
    }
}

#[tokio::test]
async fn behaviour_error_is_reported_upward() {
    let (pipeline, mut io) = PipelineBuilder::new(settings())
        .default_behavior(Arc::new(RelayBehavior))
        .behavior(StageId::CognitiveControl, Arc::new(FailingBehavior))
        .build()
        .unwrap();
    pipeline.start().unwrap();

    io.top.submit_payload("do the thing").await.unwrap();
    let report = next(&mut io.top).await;
    let error = report.as_error().expect("error envelope");
    assert_eq!(error.stage, StageId::CognitiveControl);
    assert_eq!(error.kind, ErrorKind::Stage);
    assert!(error.message.contains("cannot handle this"));

    // The failing stage keeps running.
    io.top.submit_payload("again").await.unwrap();
    assert!(next(&mut io.top).await.is_error());
    assert_eq!(pipeline.lookup(StageId::CognitiveControl).stats().failed, 2);
    assert_eq!(
        pipeline.lookup(StageId::CognitiveControl).state(),
        StageState::Running
    );

    pipeline.stop().await.unwrap();
    assert!(io.bottom.try_recv().is_none());
}

#[tokio::test]
async fn behaviour_panic_is_caught_and_reported() {
    let (pipeline, mut io) = PipelineBuilder::new(settings())
        .default_behavior(Arc::new(RelayBehavior))
        .behavior(StageId::AgentModel, Arc::new(PanickingBehavior))
        .build()
        .unwrap();
    pipeline.start().unwrap();

    io.bottom.submit_payload("status").await.unwrap();
    let report = next(&mut io.top).await;
    let error = report.as_error().expect("error envelope");
    assert_eq!(error.stage, StageId::AgentModel);
    assert_eq!(error.kind, ErrorKind::Stage);
    assert!(error.message.contains("behaviour exploded"));

    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.lookup(StageId::AgentModel).state(), StageState::Stopped);
}

#[tokio::test]
async fn error_envelopes_always_travel_upward() {
    let (pipeline, mut io) = relay_pipeline();
    pipeline.start().unwrap();

    io.top
        .submit(Envelope::error(StageId::ExecutiveFunction, ErrorKind::Stage, "from above"))
        .await
        .unwrap();
    let back = next(&mut io.top).await;
    assert_eq!(back.as_error().unwrap().message, "from above");

    io.bottom
        .submit(Envelope::error(StageId::TaskProsecution, ErrorKind::Backend, "from below"))
        .await
        .unwrap();
    let up = next(&mut io.top).await;
    assert_eq!(up.as_error().unwrap().message, "from below");

    pipeline.stop().await.unwrap();
    assert!(io.bottom.try_recv().is_none());
}

#[tokio::test]
async fn stop_finishes_the_in_flight_item_while_draining() {
    let gate = GatedBehavior::default();
    let (pipeline, io) = PipelineBuilder::new(settings())
        .default_behavior(Arc::new(RelayBehavior))
        .behavior(StageId::Aspirational, Arc::new(gate.clone()))
        .build()
        .unwrap();
    pipeline.start().unwrap();

    io.top.submit_payload("slow").await.unwrap();
    timeout(WAIT, gate.entered.notified())
        .await
        .expect("item never reached the stage");

    let stage = pipeline.lookup(StageId::Aspirational);
    let mut states = stage.subscribe();
    let observe = async {
        let reached = timeout(WAIT, states.wait_for(|s| *s == StageState::Draining))
            .await
            .expect("stage never reported draining")
            .map(|state| *state);
        assert_eq!(reached.unwrap(), StageState::Draining);
        assert_eq!(stage.stats().in_flight, 1);
        gate.release.notify_one();
    };
    let (stopped, ()) = tokio::join!(timeout(WAIT, pipeline.stop()), observe);
    stopped.expect("stop did not return").unwrap();

    let stats = stage.stats();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stage.state(), StageState::Stopped);
}

#[tokio::test]
async fn abandoned_stop_can_be_resumed() {
    let gate = GatedBehavior::default();
    let (pipeline, io) = PipelineBuilder::new(settings())
        .default_behavior(Arc::new(RelayBehavior))
        .behavior(StageId::Aspirational, Arc::new(gate.clone()))
        .build()
        .unwrap();
    pipeline.start().unwrap();

    io.top.submit_payload("slow").await.unwrap();
    timeout(WAIT, gate.entered.notified())
        .await
        .expect("item never reached the stage");

    // The held item keeps the first stop waiting; give up on it.
    assert!(timeout(Duration::from_millis(50), pipeline.stop()).await.is_err());
    assert!(pipeline.is_running());
    assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyStopped)));

    gate.release.notify_one();
    timeout(WAIT, pipeline.stop())
        .await
        .expect("resumed stop did not return")
        .unwrap();

    assert!(!pipeline.is_running());
    for stage in pipeline.stages() {
        assert_eq!(stage.state(), StageState::Stopped);
    }
    assert!(matches!(pipeline.stop().await, Err(PipelineError::AlreadyStopped)));
}

#[tokio::test]
async fn opposing_fan_out_on_tiny_queues_does_not_wedge() {
    let settings = PipelineSettings {
        queue_capacity: 1,
        ..settings()
    };
    let (pipeline, io) = PipelineBuilder::new(settings)
        .default_behavior(Arc::new(RelayBehavior))
        .behavior(
            StageId::GlobalStrategy,
            Arc::new(FanOutBehavior {
                toward: Flow::Downward,
                copies: 5,
            }),
        )
        .behavior(
            StageId::AgentModel,
            Arc::new(FanOutBehavior {
                toward: Flow::Upward,
                copies: 5,
            }),
        )
        .build()
        .unwrap();
    pipeline.start().unwrap();

    io.top.submit_payload("seed").await.unwrap();
    let strategy = pipeline.lookup(StageId::GlobalStrategy);
    let model = pipeline.lookup(StageId::AgentModel);
    eventually(|| strategy.stats().processed >= 2 && model.stats().processed >= 2).await;

    timeout(WAIT, pipeline.stop())
        .await
        .expect("stop did not return")
        .unwrap();

    for stage in pipeline.stages() {
        assert_eq!(stage.state(), StageState::Stopped);
        assert_eq!(stage.stats().in_flight, 0);
    }
    assert!(strategy.stats().dropped > 0);
    assert!(model.stats().dropped > 0);
}

#[tokio::test]
async fn overflow_at_the_bottom_is_reported_and_stop_still_returns() {
    let settings = PipelineSettings {
        queue_capacity: 1,
        ..settings()
    };
    let (pipeline, mut io) = PipelineBuilder::new(settings)
        .default_behavior(Arc::new(RelayBehavior))
        .build()
        .unwrap();
    pipeline.start().unwrap();
    let last = pipeline.lookup(StageId::TaskProsecution);

    // Nobody reads the bottom, so the second item has nowhere to go.
    io.top.submit_payload("x1").await.unwrap();
    eventually(|| last.stats().processed == 1).await;
    io.top.submit_payload("x2").await.unwrap();
    eventually(|| last.stats().processed == 2).await;

    let report = next(&mut io.top).await;
    let error = report.as_error().expect("error envelope");
    assert_eq!(error.stage, StageId::TaskProsecution);
    assert_eq!(error.kind, ErrorKind::Stage);
    assert!(error.message.contains("full"));
    assert_eq!(last.stats().dropped, 1);

    timeout(WAIT, pipeline.stop())
        .await
        .expect("stop did not return")
        .unwrap();
    assert_eq!(next(&mut io.bottom).await.text(), "x1");
}

#[tokio::test]
async fn reasoning_calls_are_billed_to_each_stage() {
    let gateway = ReasoningGateway::from_settings(Arc::new(EchoingBackend), &GatewaySettings::default())
        .unwrap();
    let (pipeline, mut io) = PipelineBuilder::new(settings())
        .gateway(Arc::new(gateway))
        .build()
        .unwrap();
    pipeline.start().unwrap();

    io.top.submit_payload("Draft a plan").await.unwrap();
    let out = next(&mut io.bottom).await;
    assert!(out.text().starts_with("ack: "));

    pipeline.stop().await.unwrap();
    let budget = Money::from_dollars(1.5).unwrap();
    for (stage, balance) in pipeline.balances() {
        assert!(balance < budget, "{stage} was not billed");
    }
}

#[tokio::test]
async fn empty_budget_reports_insufficient_funds() {
    let mut settings = settings();
    settings.stages.aspirational.budget = 0.0;
    let gateway = ReasoningGateway::from_settings(Arc::new(EchoingBackend), &GatewaySettings::default())
        .unwrap();
    let (pipeline, mut io) = PipelineBuilder::new(settings)
        .gateway(Arc::new(gateway))
        .build()
        .unwrap();
    pipeline.start().unwrap();

    io.top.submit_payload("anything").await.unwrap();
    let report = next(&mut io.top).await;
    let error = report.as_error().expect("error envelope");
    assert_eq!(error.kind, ErrorKind::InsufficientFunds);
    assert_eq!(error.stage, StageId::Aspirational);

    pipeline.stop().await.unwrap();
    assert_eq!(pipeline.lookup(StageId::Aspirational).balance(), Money::ZERO);
}

#[tokio::test]
async fn lookup_by_level_and_name() {
    let (pipeline, _io) = relay_pipeline();

    assert_eq!(pipeline.lookup_level(4).unwrap().id(), StageId::ExecutiveFunction);
    assert_eq!(
        pipeline.lookup_name("CognitiveControlLayer").unwrap().id(),
        StageId::CognitiveControl
    );
    assert!(matches!(
        pipeline.lookup_level(7),
        Err(PipelineError::UnknownStage(_))
    ));
    let err = pipeline.lookup_name("limbic").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn amendments_apply_while_running() {
    let (pipeline, _io) = relay_pipeline();
    pipeline.start().unwrap();

    let stage = pipeline.lookup(StageId::Aspirational);
    let amendment: Amendment = [
        ("mission".to_string(), ConfigValue::from("X")),
        (
            "values".to_string(),
            ConfigValue::List(vec!["a".into(), "b".into()]),
        ),
    ]
    .into();
    stage.amend(&amendment).unwrap();
    assert_eq!(stage.profile().get("mission"), Some(ConfigValue::from("X")));

    let rejected: Amendment = [("bogus".to_string(), ConfigValue::Number(1.0))].into();
    assert!(stage.amend(&rejected).is_err());

    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_factory_fails_build() {
    let mut settings = settings();
    settings.stages.global_strategy.products = vec![ace_core::EntryName::new("novel").unwrap()];
    let err = PipelineBuilder::new(settings).build().unwrap_err();
    assert!(matches!(err, PipelineError::Registry(_)));
}
