//! Demonstration jobs served by the `braid-worker` binary.

use super::serve::{JobRegistry, ProcessJob};

use serde::{Deserialize, Serialize};

use std::thread;
use std::time::Duration;

/// Counts the primes below `limit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountPrimes {
    pub limit: u64,
}

impl ProcessJob for CountPrimes {
    const NAME: &'static str = "count_primes";
    type Output = u64;

    fn run(self) -> Result<u64, String> {
        let is_prime = |n: u64| n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0);

        Ok((0..self.limit).filter(|&n| is_prime(n)).count() as u64)
    }
}

/// Sleeps, then echoes its milliseconds back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sleep {
    pub millis: u64,
}

impl ProcessJob for Sleep {
    const NAME: &'static str = "sleep";
    type Output = u64;

    fn run(self) -> Result<u64, String> {
        thread::sleep(Duration::from_millis(self.millis));
        Ok(self.millis)
    }
}

/// Always fails with `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fail {
    pub message: String,
}

impl ProcessJob for Fail {
    const NAME: &'static str = "fail";
    type Output = ();

    fn run(self) -> Result<(), String> {
        Err(self.message)
    }
}

/// Panics with `message` inside the child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panic {
    pub message: String,
}

impl ProcessJob for Panic {
    const NAME: &'static str = "panic";
    type Output = ();

    fn run(self) -> Result<(), String> {
        panic!("{}", self.message)
    }
}

/// Prints `text` to stdout, then returns it in upper case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shout {
    pub text: String,
}

impl ProcessJob for Shout {
    const NAME: &'static str = "shout";
    type Output = String;

    fn run(self) -> Result<String, String> {
        println!("{}", self.text);
        Ok(self.text.to_uppercase())
    }
}

/// Terminates the worker process, as a crash would.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exit {
    pub code: i32,
}

impl ProcessJob for Exit {
    const NAME: &'static str = "exit";
    type Output = ();

    fn run(self) -> Result<(), String> {
        std::process::exit(self.code)
    }
}

/// Registry with every demonstration job.
pub fn registry() -> JobRegistry {
    JobRegistry::new()
        .register::<CountPrimes>()
        .register::<Sleep>()
        .register::<Fail>()
        .register::<Panic>()
        .register::<Shout>()
        .register::<Exit>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_primes() {
        assert_eq!(CountPrimes { limit: 30 }.run(), Ok(10));
        assert_eq!(CountPrimes { limit: 2 }.run(), Ok(0));
    }

    #[test]
    fn registry_knows_every_job() {
        let registry = registry();

        for name in ["count_primes", "sleep", "fail", "panic", "shout", "exit"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }
}
