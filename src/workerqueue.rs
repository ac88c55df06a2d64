//! A bounded pool of worker threads.
//!
//! Each worker thread owns its own processing unit (a [Worker]) and pulls items from a shared bounded
//! queue (a crossbeam channel). Enqueuing blocks when the queue is full, so a producer cannot outrun
//! the workers.
//!
//! Errors (and panics) raised while processing an item are kept and returned by [WorkerQueue::wait_till_done].
//! After a first error the remaining items are drained without being processed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::errors::SearchError;


/// The processing unit of a worker thread.
pub trait Worker : Send + 'static {
    type Item : Send + 'static;

    /// processes one item, it may enqueue derived items in another queue
    fn process(&mut self, item : Self::Item) -> anyhow::Result<()>;

    /// called once when the queue is shut down after a successful drain
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// weight of an item used in progress reporting (not in scheduling)
    fn item_count(_item : &Self::Item) -> usize {
        1
    }
} // end of trait Worker


/// callback receiving cumulative (processed, enqueued) weights
pub type ProcessedCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;


enum Message<T> {
    Item(T),
    /// call Worker::finish and exit
    Finish,
    /// exit without finish
    Stop,
}


#[derive(Default)]
struct QueueState {
    enqueued_items : usize,
    processed_items : usize,
    enqueued_weight : usize,
    processed_weight : usize,
    /// first error raised by a worker, until returned by wait_till_done
    error : Option<anyhow::Error>,
}


struct Shared {
    state : Mutex<QueueState>,
    drained : Condvar,
    failed : AtomicBool,
    callback : RwLock<Option<ProcessedCallback>>,
}


impl Shared {
    fn new() -> Self {
        Shared{state : Mutex::new(QueueState::default()), drained : Condvar::new(), failed : AtomicBool::new(false), callback : RwLock::new(None)}
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn fail(&self, error : anyhow::Error) {
        let mut state = self.state.lock();
        if state.error.is_none() && !self.has_failed() {
            log::error!("worker queue failure : {:#}", error);
            state.error = Some(error);
        }
        self.failed.store(true, Ordering::Release);
    }

    fn item_done(&self, weight : usize) {
        let (processed, enqueued) = {
            let mut state = self.state.lock();
            state.processed_items += 1;
            state.processed_weight += weight;
            if state.processed_items == state.enqueued_items {
                self.drained.notify_all();
            }
            (state.processed_weight, state.enqueued_weight)
        };
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(processed, enqueued);
        }
    }
} // end of impl Shared


//=====================================================================================


/// A cloneable, non owning, handle to enqueue items in a WorkerQueue from any thread.
pub struct QueueHandle<T> {
    sender : Sender<Message<T>>,
    shared : Arc<Shared>,
    count : fn(&T) -> usize,
}


impl <T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        QueueHandle{sender : self.sender.clone(), shared : self.shared.clone(), count : self.count}
    }
}


impl <T : Send + 'static> QueueHandle<T> {
    /// blocks while the queue is full. Fails if the queue has already failed.
    pub fn enqueue(&self, item : T) -> Result<(), SearchError> {
        if self.shared.has_failed() {
            return Err(SearchError::PoolFailed);
        }
        let weight = (self.count)(&item);
        {
            let mut state = self.shared.state.lock();
            state.enqueued_items += 1;
            state.enqueued_weight += weight;
        }
        if self.sender.send(Message::Item(item)).is_err() {
            // all workers are gone
            let mut state = self.shared.state.lock();
            state.enqueued_items -= 1;
            state.enqueued_weight -= weight;
            return Err(SearchError::PoolFailed);
        }
        Ok(())
    } // end of enqueue

    /// number of items waiting in the queue
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
} // end of impl QueueHandle


//=====================================================================================


pub struct WorkerQueue<W : Worker> {
    name : String,
    handle : QueueHandle<W::Item>,
    threads : Vec<JoinHandle<anyhow::Result<()>>>,
}


impl <W : Worker> WorkerQueue<W> {

    /// nb_workers threads (all cpus if None), queue capacity twice the number of workers.
    /// The factory is called with the worker rank and builds the processing unit of each thread.
    pub fn new<F>(nb_workers : Option<usize>, factory : F) -> anyhow::Result<Self>
        where F : FnMut(usize) -> anyhow::Result<W> {
        let nb_workers = Self::resolve_nb_workers(nb_workers);
        Self::with_options("worker", Some(nb_workers), 2 * nb_workers, factory)
    }

    fn resolve_nb_workers(nb_workers : Option<usize>) -> usize {
        nb_workers.filter(|n| *n > 0).unwrap_or_else(num_cpus::get)
    }

    pub fn with_options<F>(name : &str, nb_workers : Option<usize>, capacity : usize, mut factory : F) -> anyhow::Result<Self>
        where F : FnMut(usize) -> anyhow::Result<W> {
        let nb_workers = Self::resolve_nb_workers(nb_workers);
        let capacity = capacity.max(1);
        log::info!("WorkerQueue {} : nb workers : {}, queue capacity : {}", name, nb_workers, capacity);
        // units are built before any thread is started so a construction error leaves nothing running
        let mut units = Vec::with_capacity(nb_workers);
        for rank in 0..nb_workers {
            units.push(factory(rank)?);
        }
        let (sender, receiver) = crossbeam_channel::bounded::<Message<W::Item>>(capacity);
        let shared = Arc::new(Shared::new());
        let mut threads = Vec::with_capacity(nb_workers);
        for (rank, unit) in units.into_iter().enumerate() {
            let receiver = receiver.clone();
            let shared = shared.clone();
            let thread = thread::Builder::new()
                    .name(format!("{}-{}", name, rank))
                    .spawn(move || worker_loop(rank, unit, receiver, shared))?;
            threads.push(thread);
        }
        let handle = QueueHandle{sender, shared, count : W::item_count};
        Ok(WorkerQueue{name : name.to_string(), handle, threads})
    } // end of with_options


    /// blocks while the queue is full
    pub fn enqueue(&self, item : W::Item) -> Result<(), SearchError> {
        self.handle.enqueue(item)
    }

    /// a handle to enqueue from other threads
    pub fn handle(&self) -> QueueHandle<W::Item> {
        self.handle.clone()
    }

    /// registers a callback called after each processed item with cumulative (processed, enqueued) weights.
    /// It runs on worker threads and must not block.
    pub fn on_processed<C>(&self, callback : C)
        where C : Fn(usize, usize) + Send + Sync + 'static {
        *self.handle.shared.callback.write() = Some(Arc::new(callback));
    }

    pub fn get_nb_workers(&self) -> usize {
        self.threads.len()
    }

    /// (processed, enqueued) item counts
    pub fn get_nb_items(&self) -> (usize, usize) {
        let state = self.handle.shared.state.lock();
        (state.processed_items, state.enqueued_items)
    }

    /// (processed, enqueued) item weights
    pub fn get_weights(&self) -> (usize, usize) {
        let state = self.handle.shared.state.lock();
        (state.processed_weight, state.enqueued_weight)
    }

    /// blocks until all items enqueued before the call are processed.
    /// Returns the first error raised by a worker.
    pub fn wait_till_done(&self) -> anyhow::Result<()> {
        let shared = &self.handle.shared;
        let mut state = shared.state.lock();
        while state.processed_items < state.enqueued_items {
            shared.drained.wait(&mut state);
        }
        log::debug!("WorkerQueue {} drained, nb items processed : {}", self.name, state.processed_items);
        if let Some(error) = state.error.take() {
            return Err(error);
        }
        if shared.has_failed() {
            return Err(SearchError::PoolFailed.into());
        }
        Ok(())
    } // end of wait_till_done


    /// drains the queue, calls finish on every worker and joins threads
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.wait_till_done()?;
        for _ in 0..self.threads.len() {
            self.handle.sender.send(Message::Finish).map_err(|_| anyhow!("worker queue {} disconnected", self.name))?;
        }
        let mut result = Ok(());
        for thread in self.threads.drain(..) {
            let res = match thread.join() {
                Ok(res) => res,
                Err(_) => Err(anyhow!("worker thread of queue {} panicked in finish", self.name)),
            };
            if result.is_ok() && res.is_err() {
                result = res;
            }
        }
        log::debug!("WorkerQueue {} shut down", self.name);
        result
    } // end of shutdown

} // end of impl WorkerQueue


impl <W : Worker> Drop for WorkerQueue<W> {
    // abandons remaining items, workers exit without finish
    fn drop(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        log::debug!("WorkerQueue {} dropped before shutdown, stopping workers", self.name);
        self.handle.shared.failed.store(true, Ordering::Release);
        for _ in 0..self.threads.len() {
            let _ = self.handle.sender.send(Message::Stop);
        }
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
} // end of impl Drop for WorkerQueue



fn panic_message(payload : &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    }
    else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    }
    else {
        "unknown panic".to_string()
    }
}


fn worker_loop<W : Worker>(rank : usize, mut unit : W, receiver : Receiver<Message<W::Item>>, shared : Arc<Shared>) -> anyhow::Result<()> {
    log::trace!("worker {} starting", rank);
    while let Ok(msg) = receiver.recv() {
        match msg {
            Message::Item(item) => {
                let weight = W::item_count(&item);
                if !shared.has_failed() {
                    match panic::catch_unwind(AssertUnwindSafe(|| unit.process(item))) {
                        Ok(Ok(())) => {},
                        Ok(Err(e)) => shared.fail(e),
                        Err(payload) => shared.fail(SearchError::WorkerPanic(rank, panic_message(payload.as_ref())).into()),
                    }
                }
                shared.item_done(weight);
            }
            Message::Finish => {
                log::trace!("worker {} finishing", rank);
                return unit.finish();
            }
            Message::Stop => break,
        }
    }
    log::trace!("worker {} stopped", rank);
    Ok(())
} // end of worker_loop



// end of mod tests
