use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// FIFO task gate with concurrency 1.
///
/// Every user-visible operation runs through [`submit`](Executor::submit),
/// which blocks the calling thread until all earlier submissions have
/// finished and then runs the task exclusively, so operations observe each
/// other in strict submission order.
///
/// Until [`set_ready`](Executor::set_ready), non-forced submissions park in
/// a holding buffer; forced ones (loading the database) enter the live queue
/// directly. `set_ready` drains the buffer into the live queue in original
/// submission order. In-memory datastores start ready.
pub(crate) struct Executor {
    state: Mutex<ExecState>,
    turn: Condvar,
}

struct ExecState {
    ready: bool,
    next_seq: u64,
    queue: VecDeque<u64>,
    buffer: VecDeque<u64>,
}

impl Executor {
    pub fn new(ready: bool) -> Executor {
        Executor {
            state: Mutex::new(ExecState {
                ready,
                next_seq: 0,
                queue: VecDeque::new(),
                buffer: VecDeque::new(),
            }),
            turn: Condvar::new(),
        }
    }

    /// Run a task once every earlier task has completed, returning its
    /// result. `forced` bypasses the not-ready buffer.
    pub fn submit<R>(&self, forced: bool, task: impl FnOnce() -> R) -> R {
        let seq;
        {
            let mut state = self.state.lock().unwrap();
            seq = state.next_seq;
            state.next_seq += 1;
            if state.ready || forced {
                state.queue.push_back(seq);
            } else {
                state.buffer.push_back(seq);
            }
        }

        let mut state = self.state.lock().unwrap();
        while state.queue.front() != Some(&seq) {
            state = self.turn.wait(state).unwrap();
        }
        drop(state);

        let result = task();

        let mut state = self.state.lock().unwrap();
        state.queue.pop_front();
        drop(state);
        self.turn.notify_all();

        result
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().unwrap().ready
    }

    /// Flip the ready flag and release the holding buffer, preserving
    /// submission order.
    pub fn set_ready(&self) {
        let mut state = self.state.lock().unwrap();
        state.ready = true;
        while let Some(seq) = state.buffer.pop_front() {
            state.queue.push_back(seq);
        }
        drop(state);
        self.turn.notify_all();
    }
}
