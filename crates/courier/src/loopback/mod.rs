//! In-process engine that completes operations on its own worker threads.
//!
//! Loading yields a model that remembers its locator; inference echoes the input
//! tensors and adds a one-element string tensor `"model"` holding that locator.
//! Every handle it gives out is tracked so callers can check for leaks and
//! invalid releases through [`LoopbackEngine::stats`].
mod config;
mod storage;

pub use config::{LoopbackConfig, ModelBehavior};

use crate::blob::Blob;
use crate::signal::CompletionSignal;
use crate::sys::{Engine, RawModel, RawStatus, RawTensor, RawTensorCollection};
use crate::status::Status;
use crate::tensor::DataType;
use anyhow::Context;
use crossbeam::channel::{Receiver, Sender};
use std::collections::HashSet;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use storage::{LoopbackCollection, LoopbackTensor};

/// Name of the string tensor added to every inference output.
pub const MODEL_OUTPUT: &str = "model";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopbackStats {
    pub live_models: usize,
    pub live_tensors: usize,
    pub live_collections: usize,
    /// Releases of handles that were not live.
    pub invalid_releases: usize,
}

impl LoopbackStats {
    pub fn live_handles(&self) -> usize {
        self.live_models + self.live_tensors + self.live_collections
    }
}

pub struct LoopbackEngine {
    config: LoopbackConfig,
    jobs: Sender<Job>,
    ledger: Arc<Ledger>,
}

impl LoopbackEngine {
    pub fn new(config: LoopbackConfig) -> anyhow::Result<Self> {
        let (jobs, queue) = crossbeam::channel::unbounded::<Job>();
        let ledger = Arc::new(Ledger::default());
        for index in 0..config.workers.max(1) {
            let queue = queue.clone();
            let ledger = ledger.clone();
            std::thread::Builder::new()
                .name(format!("courier-loopback-{index}"))
                .spawn(move || work(queue, ledger))
                .with_context(|| format!("Failed to spawn loopback worker {index}"))?;
        }
        log::debug!("Started loopback engine with {} worker(s)", config.workers.max(1));
        Ok(Self {
            config,
            jobs,
            ledger,
        })
    }

    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    pub fn stats(&self) -> LoopbackStats {
        self.ledger.stats()
    }

    fn submit(&self, job: Job) {
        if let Err(err) = self.jobs.send(job) {
            log::error!("Loopback workers are gone, failing the operation");
            // Dropping the job drops its signal, which completes with a failure.
            drop(err.into_inner());
        }
    }
}

// SAFETY: handles are boxes tracked by the ledger and only ever released once;
// tensor storage is row-major with cached data pointers, and `Tensor::from_blob`
// validates blob layouts before they reach the engine.
unsafe impl Engine for LoopbackEngine {
    fn load(&self, locator: &str, signal: CompletionSignal) {
        self.submit(Job::Load {
            locator: locator.to_owned(),
            behavior: self.config.behavior(locator),
            signal,
        });
    }

    unsafe fn infer(&self, model: RawModel, inputs: RawTensorCollection, signal: CompletionSignal) {
        // SAFETY: the caller guarantees `model` is live.
        let model = unsafe { model.cast::<LoopbackModel>().as_ref() };
        let Some(inputs) = (unsafe { self.ledger.reclaim::<LoopbackCollection>(Kind::Collection, inputs.cast()) }) else {
            signal.fail();
            return;
        };
        self.submit(Job::Infer {
            locator: model.locator.clone(),
            behavior: model.behavior.clone(),
            inputs,
            signal,
        });
    }

    unsafe fn release_model(&self, model: RawModel) {
        drop(unsafe { self.ledger.reclaim::<LoopbackModel>(Kind::Model, model.cast()) });
    }

    fn tensor_create(&self, dtype: DataType, shape: &[u64]) -> Option<RawTensor> {
        let tensor = LoopbackTensor::new(dtype, shape)?;
        Some(self.ledger.adopt(Kind::Tensor, Box::new(tensor)).cast())
    }

    fn tensor_from_blob(&self, blob: Blob, shape: &[u64], strides: &[u64]) -> Option<RawTensor> {
        if let Err(err) = crate::tensor::check_layout(blob.len(), shape, strides) {
            log::error!("Rejecting blob: {err}");
            return None;
        }
        let tensor = LoopbackTensor::from_blob(blob, shape, strides);
        Some(self.ledger.adopt(Kind::Tensor, Box::new(tensor)).cast())
    }

    unsafe fn tensor_dtype(&self, tensor: RawTensor) -> DataType {
        unsafe { tensor.cast::<LoopbackTensor>().as_ref() }.dtype()
    }

    unsafe fn tensor_shape(&self, tensor: RawTensor) -> Vec<u64> {
        unsafe { tensor.cast::<LoopbackTensor>().as_ref() }
            .shape()
            .to_vec()
    }

    unsafe fn tensor_strides(&self, tensor: RawTensor) -> Vec<u64> {
        unsafe { tensor.cast::<LoopbackTensor>().as_ref() }
            .strides()
            .to_vec()
    }

    unsafe fn tensor_data(&self, tensor: RawTensor) -> *mut c_void {
        unsafe { tensor.cast::<LoopbackTensor>().as_ref() }.data()
    }

    unsafe fn tensor_get_string(&self, tensor: RawTensor, index: u64) -> Option<String> {
        unsafe { tensor.cast::<LoopbackTensor>().as_ref() }.get_string(index)
    }

    unsafe fn tensor_set_string(&self, tensor: RawTensor, index: u64, value: &str) -> RawStatus {
        let tensor = unsafe { tensor.cast::<LoopbackTensor>().as_mut() };
        if tensor.set_string(index, value) {
            Status::Success.into()
        } else {
            Status::Failure.into()
        }
    }

    unsafe fn release_tensor(&self, tensor: RawTensor) {
        drop(unsafe { self.ledger.reclaim::<LoopbackTensor>(Kind::Tensor, tensor.cast()) });
    }

    fn collection_create(&self) -> RawTensorCollection {
        self.ledger
            .adopt(Kind::Collection, Box::<LoopbackCollection>::default())
            .cast()
    }

    unsafe fn collection_insert(&self, collection: RawTensorCollection, key: &str, tensor: RawTensor) {
        let Some(tensor) = (unsafe { self.ledger.reclaim::<LoopbackTensor>(Kind::Tensor, tensor.cast()) }) else {
            return;
        };
        let collection = unsafe { collection.cast::<LoopbackCollection>().as_mut() };
        collection.tensors.insert(key.to_owned(), tensor);
    }

    unsafe fn collection_get_and_remove(
        &self,
        collection: RawTensorCollection,
        key: &str,
    ) -> Option<RawTensor> {
        let collection = unsafe { collection.cast::<LoopbackCollection>().as_mut() };
        let tensor = collection.tensors.remove(key)?;
        Some(self.ledger.adopt(Kind::Tensor, tensor).cast())
    }

    unsafe fn collection_len(&self, collection: RawTensorCollection) -> usize {
        unsafe { collection.cast::<LoopbackCollection>().as_ref() }
            .tensors
            .len()
    }

    unsafe fn release_collection(&self, collection: RawTensorCollection) {
        drop(unsafe { self.ledger.reclaim::<LoopbackCollection>(Kind::Collection, collection.cast()) });
    }
}

struct LoopbackModel {
    locator: String,
    behavior: ModelBehavior,
}

enum Job {
    Load {
        locator: String,
        behavior: ModelBehavior,
        signal: CompletionSignal,
    },
    Infer {
        locator: String,
        behavior: ModelBehavior,
        inputs: Box<LoopbackCollection>,
        signal: CompletionSignal,
    },
}

impl Job {
    fn run(self, ledger: &Ledger) {
        match self {
            Job::Load {
                locator,
                behavior,
                signal,
            } => {
                std::thread::sleep(behavior.load_delay());
                if locator.is_empty() || behavior.fail_load {
                    log::debug!("Failing load of '{locator}'");
                    signal.fail();
                    return;
                }
                let model = ledger.adopt(Kind::Model, Box::new(LoopbackModel { locator, behavior }));
                // SAFETY: a freshly adopted model handle, owned by nobody else.
                unsafe { signal.succeed(model) };
            }
            Job::Infer {
                locator,
                behavior,
                mut inputs,
                signal,
            } => {
                std::thread::sleep(behavior.infer_delay());
                if behavior.fail_infer {
                    log::debug!("Failing inference on '{locator}'");
                    signal.fail();
                    return;
                }
                inputs.tensors.insert(
                    MODEL_OUTPUT.to_owned(),
                    Box::new(LoopbackTensor::string(&locator)),
                );
                let outputs = ledger.adopt(Kind::Collection, inputs);
                // SAFETY: a freshly adopted collection handle, owned by nobody else.
                unsafe { signal.succeed(outputs) };
            }
        }
    }
}

fn work(queue: Receiver<Job>, ledger: Arc<Ledger>) {
    for job in queue.iter() {
        job.run(&ledger);
    }
    log::debug!("Loopback worker exiting");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Model,
    Tensor,
    Collection,
}

/// Handles currently owned outside the engine.
#[derive(Default)]
struct Ledger {
    live: Mutex<HashSet<(Kind, usize)>>,
    invalid_releases: AtomicUsize,
}

impl Ledger {
    fn lock(&self) -> MutexGuard<'_, HashSet<(Kind, usize)>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand an object out as a handle.
    fn adopt<T>(&self, kind: Kind, object: Box<T>) -> NonNull<T> {
        let raw = NonNull::from(Box::leak(object));
        self.lock().insert((kind, raw.as_ptr() as usize));
        raw
    }

    /// Take a handle back. Returns `None` (and counts it) if the handle is not live.
    ///
    /// # Safety
    /// A live `raw` of `kind` must have been produced by `adopt::<T>`.
    unsafe fn reclaim<T>(&self, kind: Kind, raw: NonNull<T>) -> Option<Box<T>> {
        if self.lock().remove(&(kind, raw.as_ptr() as usize)) {
            Some(unsafe { Box::from_raw(raw.as_ptr()) })
        } else {
            self.invalid_releases.fetch_add(1, Ordering::SeqCst);
            log::error!("Release of a {kind:?} handle that is not live: {raw:p}");
            None
        }
    }

    fn stats(&self) -> LoopbackStats {
        let live = self.lock();
        let count = |kind: Kind| live.iter().filter(|(k, _)| *k == kind).count();
        LoopbackStats {
            live_models: count(Kind::Model),
            live_tensors: count(Kind::Tensor),
            live_collections: count(Kind::Collection),
            invalid_releases: self.invalid_releases.load(Ordering::SeqCst),
        }
    }
}
