//! Bounded inter-stage queues.
//!
//! Six stages sit on a chain with seven boundaries: boundary 0 is above the
//! first stage, boundary 6 below the last, and boundary `i` (1..=5) between
//! stage `i-1` and stage `i` (zero-based). Every boundary carries two
//! independent one-directional channels: `down` and `up`.
//!
//! A stage's "to below" sender and the next stage's "from above" receiver are
//! the two ends of the same channel. Nothing is copied between them.

use ace_core::{Envelope, MessageId, StageId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::pipeline::PipelineError;

/// The receiving ends a stage drains.
#[derive(Debug)]
pub struct StageInbox {
    /// Items travelling down, pushed by the stage above.
    pub from_above: mpsc::Receiver<Envelope>,
    /// Items travelling up, pushed by the stage below.
    pub from_below: mpsc::Receiver<Envelope>,
}

/// The sending ends a stage pushes into.
#[derive(Debug, Clone)]
pub struct StageOutbox {
    /// Into the next stage's `from_above`.
    pub to_below: mpsc::Sender<Envelope>,
    /// Into the previous stage's `from_below`.
    pub to_above: mpsc::Sender<Envelope>,
}

/// One end of the pipeline as seen from outside.
#[derive(Debug)]
pub struct Boundary {
    side: &'static str,
    submit: mpsc::Sender<Envelope>,
    output: mpsc::Receiver<Envelope>,
}

impl Boundary {
    /// Pushes an envelope into the pipeline at this end, waiting for queue
    /// capacity.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Closed`] if the receiving stage has been dropped.
    pub async fn submit(&self, envelope: Envelope) -> Result<MessageId, PipelineError> {
        let id = envelope.id;
        self.submit
            .send(envelope)
            .await
            .map_err(|_| PipelineError::Closed { side: self.side })?;
        Ok(id)
    }

    /// Wraps `value` as an external payload and submits it.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub async fn submit_payload(
        &self,
        value: impl Into<serde_json::Value>,
    ) -> Result<MessageId, PipelineError> {
        self.submit(Envelope::external(value)).await
    }

    /// Waits for the next envelope leaving the pipeline at this end.
    ///
    /// Returns `None` once every stage sender is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.output.recv().await
    }

    /// Takes an envelope if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        match self.output.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// A cloneable handle for submitting from other tasks.
    pub fn submitter(&self) -> mpsc::Sender<Envelope> {
        self.submit.clone()
    }
}

/// The two external ends of a pipeline.
///
/// `top.submit` feeds the first stage from above and `top.recv` yields what
/// the first stage passes up. `bottom.submit` feeds the last stage from
/// below and `bottom.recv` yields what the last stage passes down.
#[derive(Debug)]
pub struct PipelineIo {
    /// Above the first stage.
    pub top: Boundary,
    /// Below the last stage.
    pub bottom: Boundary,
}

/// Both directions of one boundary, before they are handed out.
struct Link {
    down: (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>),
    up: (mpsc::Sender<Envelope>, mpsc::Receiver<Envelope>),
}

impl Link {
    fn new(capacity: usize) -> Self {
        Self {
            down: mpsc::channel(capacity),
            up: mpsc::channel(capacity),
        }
    }
}

/// The result of wiring: one inbox and one outbox per stage, in pipeline
/// order, plus the external ends.
pub(crate) struct Wiring {
    pub(crate) ends: Vec<(StageInbox, StageOutbox)>,
    pub(crate) io: PipelineIo,
}

/// Creates every channel of the chain with the given capacity.
pub(crate) fn wire(capacity: usize) -> Wiring {
    let boundaries = StageId::ALL.len() + 1;
    let mut senders_down = Vec::with_capacity(boundaries);
    let mut senders_up = Vec::with_capacity(boundaries);
    let mut receivers_down = Vec::with_capacity(boundaries);
    let mut receivers_up = Vec::with_capacity(boundaries);

    for _ in 0..boundaries {
        let link = Link::new(capacity);
        senders_down.push(Some(link.down.0));
        receivers_down.push(Some(link.down.1));
        senders_up.push(Some(link.up.0));
        receivers_up.push(Some(link.up.1));
    }

    // Stage i drains down[i] and up[i+1], and pushes into down[i+1] and up[i].
    let mut ends = Vec::with_capacity(StageId::ALL.len());
    for i in 0..StageId::ALL.len() {
        let inbox = StageInbox {
            from_above: take(&mut receivers_down, i),
            from_below: take(&mut receivers_up, i + 1),
        };
        let outbox = StageOutbox {
            to_below: clone_at(&senders_down, i + 1),
            to_above: clone_at(&senders_up, i),
        };
        ends.push((inbox, outbox));
    }

    let last = boundaries - 1;
    let io = PipelineIo {
        top: Boundary {
            side: "top",
            submit: take(&mut senders_down, 0),
            output: take(&mut receivers_up, 0),
        },
        bottom: Boundary {
            side: "bottom",
            submit: take(&mut senders_up, last),
            output: take(&mut receivers_down, last),
        },
    };

    Wiring { ends, io }
}

// Every slot is taken exactly once by construction of `wire`.
fn take<T>(slots: &mut [Option<T>], index: usize) -> T {
    match slots[index].take() {
        Some(value) => value,
        None => unreachable!("queue slot {index} taken twice"),
    }
}

fn clone_at<T: Clone>(slots: &[Option<T>], index: usize) -> T {
    match &slots[index] {
        Some(value) => value.clone(),
        None => unreachable!("queue slot {index} already taken"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ace_core::Envelope;

    #[tokio::test]
    async fn queue_delivers_in_push_order() {
        let Wiring { mut ends, io: _io } = wire(8);
        let (_, upper_outbox) = ends.remove(0);
        let (mut lower_inbox, _) = ends.remove(0);

        for item in ["x1", "x2", "x3"] {
            upper_outbox.to_below.send(Envelope::external(item)).await.unwrap();
        }

        let mut drained = Vec::new();
        for _ in 0..3 {
            drained.push(lower_inbox.from_above.recv().await.unwrap().text());
        }
        assert_eq!(drained, vec!["x1", "x2", "x3"]);
    }

    #[tokio::test]
    async fn adjacent_stages_share_one_channel_per_direction() {
        let Wiring { mut ends, io } = wire(4);
        let (mut first_inbox, first_outbox) = ends.remove(0);
        let (mut second_inbox, second_outbox) = ends.remove(0);

        first_outbox.to_below.send(Envelope::external("down")).await.unwrap();
        second_outbox.to_above.send(Envelope::external("up")).await.unwrap();

        assert_eq!(second_inbox.from_above.recv().await.unwrap().text(), "down");
        assert_eq!(first_inbox.from_below.recv().await.unwrap().text(), "up");

        io.top.submit_payload("from outside").await.unwrap();
        assert_eq!(first_inbox.from_above.recv().await.unwrap().text(), "from outside");
    }

    #[tokio::test]
    async fn pipeline_ends_connect_to_first_and_last_stage() {
        let Wiring { mut ends, mut io } = wire(4);
        let (mut last_inbox, last_outbox) = ends.pop().unwrap();
        let (_, first_outbox) = ends.remove(0);

        first_outbox.to_above.send(Envelope::external("escalated")).await.unwrap();
        assert_eq!(io.top.recv().await.unwrap().text(), "escalated");

        last_outbox.to_below.send(Envelope::external("executed")).await.unwrap();
        assert_eq!(io.bottom.recv().await.unwrap().text(), "executed");

        io.bottom.submit_payload("sensor").await.unwrap();
        assert_eq!(last_inbox.from_below.recv().await.unwrap().text(), "sensor");
        assert!(io.top.try_recv().is_none());
    }
}
