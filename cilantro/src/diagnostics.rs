use std::fmt::{Display, Formatter};
use std::sync::Mutex;

use crate::error::Error;

/// A recoverable-corruption report: the error plus where it was found,
/// e.g. `TypeDef[3].Name` or `#Blob[0x1F2]`.
#[derive(Debug)]
pub struct Warning {
	pub error: Error,
	pub context: String,
}

impl Warning {
	pub fn new(error: Error, context: impl Into<String>) -> Self {
		Self { error, context: context.into() }
	}
}

impl Display for Warning {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.context, self.error)
	}
}

/// Receives every recoverable-corruption warning the parser emits.
///
/// The parser never aborts a parse for recoverable corruption; it reports
/// through this sink and degrades the affected field to absent.
pub trait WarningSink: Send + Sync {
	fn warn(&self, warning: Warning);
}

/// Default sink: forwards to [`tracing::warn!`].
#[derive(Debug, Default)]
pub struct LogSink;

impl WarningSink for LogSink {
	fn warn(&self, warning: Warning) {
		tracing::warn!(target: "cilantro", context = %warning.context, "{}", warning.error);
	}
}

/// Discards every warning.
#[derive(Debug, Default)]
pub struct NullSink;

impl WarningSink for NullSink {
	fn warn(&self, _: Warning) {}
}

/// Accumulates warnings for later inspection; handy in tests and triage
/// tooling that wants the full corruption report of a sample.
#[derive(Debug, Default)]
pub struct CollectSink {
	warnings: Mutex<Vec<Warning>>,
}

impl CollectSink {
	pub fn take(&self) -> Vec<Warning> {
		let mut warnings = self.warnings.lock().unwrap_or_else(|e| e.into_inner());
		std::mem::take(&mut *warnings)
	}

	pub fn len(&self) -> usize {
		self.warnings.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl WarningSink for CollectSink {
	fn warn(&self, warning: Warning) {
		self.warnings.lock().unwrap_or_else(|e| e.into_inner()).push(warning);
	}
}
