use super::wire::{Request, Response};
use crate::error::{Result, panic_message};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::os::fd::{FromRawFd, OwnedFd};
use std::panic::{self, AssertUnwindSafe};

/// A job a [`ProcessPool`](super::ProcessPool) can run in a child process.
///
/// The job value travels to the child as JSON, runs there, and its
/// output travels back the same way. Parent and child must agree on
/// `NAME`, which is how the child finds the job in its [`JobRegistry`].
///
/// Under [`serve`], the child's stdout is redirected to its stderr, so a
/// job may print freely without disturbing the response channel.
///
/// # Examples
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Square(u64);
///
/// impl ProcessJob for Square {
///     const NAME: &'static str = "square";
///     type Output = u64;
///
///     fn run(self) -> Result<u64, String> {
///         Ok(self.0 * self.0)
///     }
/// }
/// ```
pub trait ProcessJob: Serialize + DeserializeOwned + Send + 'static {
    const NAME: &'static str;

    type Output: Serialize + DeserializeOwned + Send + 'static;

    fn run(self) -> std::result::Result<Self::Output, String>;
}

type Handler = Box<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// The jobs a child process knows how to run, by name.
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `J` runnable by this child.
    pub fn register<J: ProcessJob>(mut self) -> Self {
        let handler: Handler = Box::new(|payload| {
            let job: J = serde_json::from_value(payload).map_err(|err| err.to_string())?;
            let output = job.run()?;

            serde_json::to_value(output).map_err(|err| err.to_string())
        });

        self.handlers.insert(J::NAME, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    fn handle(&self, request: Request) -> Response {
        let id = request.id;

        let Some(handler) = self.handlers.get(request.job.as_str()) else {
            return Response::Err {
                id,
                message: format!("unknown job `{}`", request.job),
            };
        };

        match panic::catch_unwind(AssertUnwindSafe(|| handler(request.payload))) {
            Ok(Ok(value)) => Response::Ok { id, value },
            Ok(Err(message)) => Response::Err { id, message },
            Err(payload) => Response::Panicked {
                id,
                message: panic_message(&*payload),
            },
        }
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Serves jobs from stdin until the parent closes it.
///
/// This is the whole body of a worker child's `main`.
pub fn serve(registry: &JobRegistry) -> Result<()> {
    let responses = take_stdout()?;
    let stdin = io::stdin();

    serve_with(registry, stdin.lock(), BufWriter::new(responses))
}

/// Moves the original stdout aside for responses and points fd 1 at
/// stderr, where anything a job prints ends up.
fn take_stdout() -> io::Result<File> {
    io::stdout().flush()?;

    // Safety: `dup` returns a fresh descriptor that nothing else owns.
    let saved = unsafe { libc::dup(libc::STDOUT_FILENO) };
    if saved < 0 {
        return Err(io::Error::last_os_error());
    }
    let responses = unsafe { OwnedFd::from_raw_fd(saved) };

    if unsafe { libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) } < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(File::from(responses))
}

/// Serves jobs from `input`, writing responses to `output`.
pub fn serve_with(registry: &JobRegistry, input: impl BufRead, mut output: impl Write) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = serde_json::from_str(&line)?;
        let response = registry.handle(request);

        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
    }

    Ok(())
}
