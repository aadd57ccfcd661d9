use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::manager::{
    ModelManager, PreparedModels, ReloadInputs, prepare_models, try_prepare_models,
};

#[derive(Resource)]
pub struct ModelReloadResources {
    pub runtime: Arc<Runtime>,
    pub job_tx: UnboundedSender<(u64, ModelReloadRequest)>,
    pub result_rx: Mutex<UnboundedReceiver<ModelReloadOutcome>>,
}

/// A finished reload job. `prepared` is `None` when the gate was dropped without firing.
pub struct ModelReloadOutcome {
    pub sequence: u64,
    pub prepared: Option<PreparedModels>,
}

impl FromWorld for ModelReloadResources {
    fn from_world(_world: &mut World) -> Self {
        let runtime = Arc::new(Runtime::new().expect("Failed to create tokio runtime"));
        let (job_tx, mut job_rx) = unbounded_channel::<(u64, ModelReloadRequest)>();
        let (result_tx, result_rx) = unbounded_channel::<ModelReloadOutcome>();
        let runtime_clone = runtime.clone();

        runtime.spawn(async move {
            while let Some((sequence, request)) = job_rx.recv().await {
                let result_tx = result_tx.clone();
                runtime_clone.spawn(async move {
                    let ModelReloadRequest { inputs, gate } = request;
                    let prepared = match gate {
                        Some(gate) => match try_prepare_models(inputs, gate).await {
                            Ok(prepared) => Some(prepared),
                            Err(_) => {
                                warn!(
                                    "Model reload {} lost its gate, keeping current models",
                                    sequence
                                );
                                None
                            }
                        },
                        None => Some(prepare_models(inputs, async {}).await),
                    };
                    let _ = result_tx.send(ModelReloadOutcome { sequence, prepared });
                });
            }
        });

        Self {
            runtime,
            job_tx,
            result_rx: Mutex::new(result_rx),
        }
    }
}

/// A reload to run. With a gate, the result is held back until the gate fires, and dropped if
/// the sender goes away first.
pub struct ModelReloadRequest {
    pub inputs: ReloadInputs,
    pub gate: Option<oneshot::Receiver<()>>,
}

impl ModelReloadRequest {
    pub fn new(inputs: ReloadInputs) -> Self {
        Self { inputs, gate: None }
    }

    pub fn gated(inputs: ReloadInputs) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inputs,
                gate: Some(rx),
            },
            tx,
        )
    }
}

#[derive(Resource, Default)]
pub struct ModelReloadQueue(pub Vec<ModelReloadRequest>);

/// Reloads are numbered in the order they are started. Only a result newer than the last
/// applied one is published, so a slow reload never replaces a later one.
#[derive(Resource, Default)]
pub struct ModelReloadInFlight {
    pub pending: usize,
    next_sequence: u64,
    last_applied: Option<u64>,
}

impl ModelReloadInFlight {
    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }
}

/// Runs model reloads off the main schedule and publishes finished generations in
/// `PostUpdate`.
pub struct ModelReloadPlugin;

impl Plugin for ModelReloadPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ModelManager>()
            .init_resource::<ModelReloadResources>()
            .init_resource::<ModelReloadQueue>()
            .init_resource::<ModelReloadInFlight>()
            .add_systems(Update, start_model_reloads)
            .add_systems(PostUpdate, apply_model_reloads);
    }
}

fn start_model_reloads(
    mut queue: ResMut<ModelReloadQueue>,
    reload: Res<ModelReloadResources>,
    mut in_flight: ResMut<ModelReloadInFlight>,
) {
    for request in queue.0.drain(..) {
        let sequence = in_flight.next_sequence;
        if reload.job_tx.send((sequence, request)).is_err() {
            warn!("Model reload worker is gone, dropping reload request");
            continue;
        }
        in_flight.next_sequence += 1;
        in_flight.pending += 1;
    }
}

fn apply_model_reloads(
    reload: Res<ModelReloadResources>,
    mut manager: ResMut<ModelManager>,
    mut in_flight: ResMut<ModelReloadInFlight>,
) {
    let mut receiver = reload
        .result_rx
        .lock()
        .expect("model reload receiver lock poisoned");

    while let Ok(outcome) = receiver.try_recv() {
        in_flight.pending = in_flight.pending.saturating_sub(1);
        let Some(prepared) = outcome.prepared else {
            continue;
        };
        if in_flight.last_applied.is_some_and(|last| outcome.sequence < last) {
            debug!(
                "Discarding model reload {}, reload {:?} is already live",
                outcome.sequence, in_flight.last_applied
            );
            continue;
        }
        in_flight.last_applied = Some(outcome.sequence);
        manager.apply(prepared);
    }
}
