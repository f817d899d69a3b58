use super::serve::ProcessJob;
use super::wire::{Request, Response};
use super::worker::{Flow, Job, Workers};
use crate::bridge::{PoolFuture, WorkerPool};
use crate::error::{Error, Result};
use crate::promise::{Promise, Resolver};

use serde::de::DeserializeOwned;
use serde_json::Value;

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use tracing::{debug, warn};

/// A pool of worker processes.
///
/// Every worker thread owns one child process running
/// [`serve`](super::serve) and forwards jobs to it as JSON lines. Jobs
/// are [`ProcessJob`]s, so their input and output must be serializable.
///
/// A child that exits or breaks its pipe fails the job it was running
/// with [`Error::WorkerCrashed`] and its worker leaves the pool; the
/// other workers carry on. Once no worker is left, queued and new jobs
/// fail instead of waiting forever.
///
/// # Examples
///
/// ```rust,ignore
/// let pool = ProcessPool::builder("braid-worker").workers(2).build()?;
///
/// let primes = pool.submit(CountPrimes { limit: 100_000 }).await?;
/// ```
pub struct ProcessPool {
    workers: Workers<Task>,
}

/// A job queued for a child, with the cell its response settles.
struct Task {
    job: &'static str,
    payload: Value,
    delivery: Box<dyn Deliver>,
}

/// Decodes a child's response into the typed result cell.
trait Deliver: Send {
    fn is_complete(&self) -> bool;

    fn deliver(self: Box<Self>, outcome: Result<Value>);
}

impl<T: DeserializeOwned + Send> Deliver for Resolver<T> {
    fn is_complete(&self) -> bool {
        Resolver::is_complete(self)
    }

    fn deliver(self: Box<Self>, outcome: Result<Value>) {
        let decoded = outcome.and_then(|value| serde_json::from_value(value).map_err(Error::from));

        let _ = match decoded {
            Ok(value) => self.resolve(value),
            Err(err) => self.reject(err),
        };
    }
}

impl Job for Task {
    fn abandon(self, error: Error) {
        self.delivery.deliver(Err(error));
    }
}

/// The parent's end of one child process.
struct ChildWorker {
    index: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl ChildWorker {
    fn spawn(index: usize, command: &mut Command) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(Error::InvalidState("child process pipes were not captured"));
        };

        debug!(worker = index, pid = child.id(), "worker process started");

        Ok(Self {
            index,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            next_id: 0,
        })
    }

    fn crashed(&self, reason: impl Into<String>) -> Error {
        Error::WorkerCrashed {
            worker: self.index,
            reason: reason.into(),
        }
    }

    /// Runs one job in the child and waits for its response.
    ///
    /// The outer error means the child is unusable; the inner result is
    /// the job's own outcome.
    fn call(&mut self, job: &str, payload: Value) -> Result<Result<Value>> {
        self.next_id += 1;
        let id = self.next_id;

        let request = Request {
            id,
            job: job.to_string(),
            payload,
        };

        let mut line = match serde_json::to_vec(&request) {
            Ok(line) => line,
            Err(err) => return Ok(Err(err.into())),
        };
        line.push(b'\n');

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.crashed("worker process input is closed"));
        };

        if let Err(err) = stdin.write_all(&line).and_then(|()| stdin.flush()) {
            return Err(self.crashed(format!("broken pipe: {err}")));
        }

        let mut reply = String::new();
        match self.stdout.read_line(&mut reply) {
            Ok(0) => {
                let reason = self.exit_reason();
                return Err(self.crashed(reason));
            }
            Ok(_) => {}
            Err(err) => return Err(self.crashed(format!("broken pipe: {err}"))),
        }

        let response: Response = match serde_json::from_str(&reply) {
            Ok(response) => response,
            Err(err) => return Err(self.crashed(format!("malformed response: {err}"))),
        };

        if response.id() != id {
            return Err(self.crashed(format!("response {} does not match request {id}", response.id())));
        }

        Ok(match response {
            Response::Ok { value, .. } => Ok(value),
            Response::Err { message, .. } => Err(Error::job(message)),
            // The child caught the panic and keeps serving.
            Response::Panicked { message, .. } => Err(self.crashed(message)),
        })
    }

    /// Describes how the child went away.
    fn exit_reason(&mut self) -> String {
        match self.child.wait() {
            Ok(status) => format!("worker process exited ({status})"),
            Err(err) => format!("worker process vanished: {err}"),
        }
    }

    fn handle(&mut self, task: Task) -> Flow {
        if task.delivery.is_complete() {
            debug!(worker = self.index, job = task.job, "skipping job whose result was cancelled");
            return Flow::Continue;
        }

        debug!(worker = self.index, job = task.job, "dispatching job");
        match self.call(task.job, task.payload) {
            Ok(outcome) => {
                if let Err(Error::WorkerCrashed { reason, .. }) = &outcome {
                    warn!(worker = self.index, %reason, "job panicked in worker process");
                }

                task.delivery.deliver(outcome);
                Flow::Continue
            }
            Err(crash) => {
                if let Error::WorkerCrashed { reason, .. } = &crash {
                    warn!(worker = self.index, %reason, "worker process crashed");
                }

                task.delivery.deliver(Err(crash));

                // The child may still be alive behind a broken protocol.
                let _ = self.child.kill();
                Flow::Retire
            }
        }
    }
}

impl Drop for ChildWorker {
    /// Closes the child's stdin so it exits, then reaps it.
    fn drop(&mut self) {
        drop(self.stdin.take());

        if let Ok(None) = self.child.try_wait() {
            if let Err(err) = self.child.wait() {
                warn!(worker = self.index, %err, "failed to reap worker process");
            }
        }
    }
}

impl ProcessPool {
    /// Starts configuring a pool whose children run `program`.
    pub fn builder(program: impl AsRef<OsStr>) -> ProcessPoolBuilder {
        ProcessPoolBuilder::new(program)
    }

    /// Starts a pool of `workers` children running `program`, runs `f`
    /// with it, then shuts it down.
    ///
    /// The pool is shut down on every exit path, including unwinding.
    pub fn scope<R>(
        program: impl AsRef<OsStr>,
        workers: usize,
        f: impl FnOnce(&ProcessPool) -> R,
    ) -> Result<R> {
        let pool = Self::builder(program).workers(workers).build()?;
        let out = f(&pool);
        pool.shutdown();

        Ok(out)
    }

    /// Sends `job` to a child and returns a future of its output.
    pub fn submit<J: ProcessJob>(&self, job: J) -> PoolFuture<J::Output> {
        let (promise, resolver) = Promise::new();

        match serde_json::to_value(&job) {
            Ok(payload) => self.workers.submit(Task {
                job: J::NAME,
                payload,
                delivery: Box::new(resolver),
            }),
            Err(err) => {
                let _ = resolver.reject(err.into());
            }
        }

        PoolFuture::new(promise)
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Number of workers whose child is still usable.
    pub fn alive(&self) -> usize {
        self.workers.alive()
    }

    pub fn queued(&self) -> usize {
        self.workers.queued()
    }

    /// Lets every queued job finish, then stops the children.
    pub fn shutdown(mut self) {
        self.workers.shutdown();
    }
}

impl<J: ProcessJob> WorkerPool<J> for ProcessPool {
    type Output = J::Output;

    fn submit_job(&self, job: J) -> PoolFuture<J::Output> {
        self.submit(job)
    }
}

impl fmt::Debug for ProcessPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessPool")
            .field("workers", &self.workers.len())
            .field("alive", &self.workers.alive())
            .finish()
    }
}

/// Builder for a [`ProcessPool`].
#[derive(Debug, Clone)]
pub struct ProcessPoolBuilder {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    workers: usize,
    name: String,
}

impl ProcessPoolBuilder {
    fn new(program: impl AsRef<OsStr>) -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            envs: Vec::new(),
            workers,
            name: "braid-process".to_string(),
        }
    }

    /// Sets the number of child processes.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn workers(mut self, n: usize) -> Self {
        assert!(n > 0, "workers must be > 0");

        self.workers = n;
        self
    }

    /// Adds an argument passed to every child.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Sets an environment variable for every child.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Sets the prefix of the worker thread names.
    pub fn name(mut self, prefix: impl Into<String>) -> Self {
        self.name = prefix.into();
        self
    }

    /// Spawns the children and their worker threads.
    ///
    /// Children already started are stopped if a later one fails.
    pub fn build(self) -> Result<ProcessPool> {
        let mut children = Vec::with_capacity(self.workers);

        for index in 0..self.workers {
            let mut command = Command::new(&self.program);
            command.args(&self.args).envs(self.envs.iter().cloned());

            children.push(ChildWorker::spawn(index, &mut command)?);
        }

        let handlers = children
            .into_iter()
            .map(|mut child| move |task: Task| child.handle(task))
            .collect();

        Ok(ProcessPool {
            workers: Workers::start(&self.name, handlers)?,
        })
    }
}
