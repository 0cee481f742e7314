//! Diagnostics produced while reading map files.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::*;

/// A position in a map source, 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileLocation {
	pub line: usize,
	pub column: usize,
}
impl FileLocation {
	pub const fn new(line: usize, column: usize) -> Self {
		Self { line, column }
	}
}
impl fmt::Display for FileLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "line {}, column {}", self.line, self.column)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display)]
pub enum Severity {
	#[strum(serialize = "warning")]
	Warning,
	#[strum(serialize = "error")]
	Error,
}

/// What went wrong, and therefore what happened to the offending piece of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIs)]
pub enum DiagnosticKind {
	/// A malformed token. The token is skipped.
	LexError,
	/// Unbalanced braces or an unexpected token. The enclosing block is skipped.
	StructuralError,
	/// An object parsed fine but couldn't be built, such as a degenerate brush. The object is dropped.
	ConstructionError,
	/// An object couldn't be attached where the document says it belongs, and was attached somewhere else.
	ResolutionWarning,
}
impl DiagnosticKind {
	pub fn severity(self) -> Severity {
		match self {
			Self::LexError | Self::StructuralError | Self::ConstructionError => Severity::Error,
			Self::ResolutionWarning => Severity::Warning,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
	pub kind: DiagnosticKind,
	pub severity: Severity,
	pub message: String,
	pub location: Option<FileLocation>,
}
impl Diagnostic {
	pub fn new(kind: DiagnosticKind, message: impl Into<String>, location: Option<FileLocation>) -> Self {
		Self {
			kind,
			severity: kind.severity(),
			message: message.into(),
			location,
		}
	}
}
impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.location {
			Some(location) => write!(f, "{} ({}) at {location}: {}", self.severity, self.kind, self.message),
			None => write!(f, "{} ({}): {}", self.severity, self.kind, self.message),
		}
	}
}

/// Receives the non-fatal problems found while reading. Called from builder worker threads, so appends must be synchronized.
pub trait DiagnosticsSink: Send + Sync {
	fn report(&self, diagnostic: Diagnostic);

	fn lex_error(&self, location: FileLocation, message: String) {
		self.report(Diagnostic::new(DiagnosticKind::LexError, message, Some(location)));
	}
	fn structural_error(&self, location: FileLocation, message: String) {
		self.report(Diagnostic::new(DiagnosticKind::StructuralError, message, Some(location)));
	}
	fn construction_error(&self, location: FileLocation, message: String) {
		self.report(Diagnostic::new(DiagnosticKind::ConstructionError, message, Some(location)));
	}
	fn resolution_warning(&self, location: Option<FileLocation>, message: String) {
		self.report(Diagnostic::new(DiagnosticKind::ResolutionWarning, message, location));
	}
}

/// The standard [`DiagnosticsSink`], collects diagnostics in a list and logs them as they come in.
#[derive(Debug, Default)]
pub struct ParserStatus {
	diagnostics: Mutex<Vec<Diagnostic>>,
}
impl ParserStatus {
	/// A copy of everything reported so far. Ordering of diagnostics reported from parallel work is unspecified.
	pub fn diagnostics(&self) -> Vec<Diagnostic> {
		self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner).clone()
	}

	pub fn into_diagnostics(self) -> Vec<Diagnostic> {
		self.diagnostics.into_inner().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn count(&self, kind: DiagnosticKind) -> usize {
		self.diagnostics
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.filter(|diagnostic| diagnostic.kind == kind)
			.count()
	}

	pub fn has_errors(&self) -> bool {
		self.diagnostics
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.any(|diagnostic| diagnostic.severity == Severity::Error)
	}

	pub fn is_empty(&self) -> bool {
		self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
	}
}
impl DiagnosticsSink for ParserStatus {
	fn report(&self, diagnostic: Diagnostic) {
		match diagnostic.severity {
			Severity::Warning => warn!("{diagnostic}"),
			Severity::Error => error!("{diagnostic}"),
		}

		self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner).push(diagnostic);
	}
}

/// Errors that stop a read entirely, no tree is produced.
#[derive(Error, Debug)]
pub enum MapReadError {
	#[error("document is empty")]
	EmptyDocument,
	#[error("no recognizable {expected} found in document")]
	NoContent { expected: &'static str },
	#[error("world factory failed: {0}")]
	WorldFactory(anyhow::Error),
	#[error("world factory returned a world without a default layer")]
	InvalidWorld,
}

#[test]
fn status_collects() {
	let status = ParserStatus::default();
	assert!(status.is_empty());

	status.resolution_warning(None, "orphan".s());
	assert!(!status.has_errors());

	status.construction_error(FileLocation::new(4, 1), "degenerate".s());
	assert!(status.has_errors());
	assert_eq!(status.count(DiagnosticKind::ConstructionError), 1);

	let diagnostics = status.into_diagnostics();
	assert_eq!(diagnostics.len(), 2);
	assert_eq!(diagnostics[1].to_string(), "error (ConstructionError) at line 4, column 1: degenerate");
}
