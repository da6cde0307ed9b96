use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, warn};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::errors::{classify, classify_panic, ErrorKind, ErrorList, ErrorMessage, Focus};
use crate::grammar::{Compiler, GrammarModel};
use crate::runtime::{self, Analysis, LexerToken, ParseNode, RunOptions};

pub const DEFAULT_MAX_DEPTH: usize = 1000;
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterpreterConfig {
    /// Parser rule to start from; the first declared parser rule if unset.
    pub start_rule: Option<String>,
    /// Maximum nesting of parser rule invocations.
    pub max_depth: usize,
    /// Stack size of the worker thread that runs each interpretation.
    pub stack_size: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            start_rule: None,
            max_depth: DEFAULT_MAX_DEPTH,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl InterpreterConfig {
    pub fn with_start_rule(mut self, name: impl Into<String>) -> Self {
        self.start_rule = Some(name.into());
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Shared flag checked by the lexer and parser loops.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ============================================================================
// RESULT
// ============================================================================

/// Everything one interpretation produced.
///
/// When analysis ran it is either a token list or a tree, never both; it is
/// absent only when errors preempted it.
#[derive(Debug, Clone, Serialize)]
pub struct InterpretationResult {
    #[serde(skip)]
    grammar: Option<Arc<GrammarModel>>,
    analysis: Option<Analysis>,
    errors: ErrorList,
}

impl InterpretationResult {
    fn failed(grammar: Option<Arc<GrammarModel>>, errors: ErrorList) -> Self {
        Self {
            grammar,
            analysis: None,
            errors,
        }
    }

    pub fn grammar(&self) -> Option<&GrammarModel> {
        self.grammar.as_deref()
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    pub fn tokens(&self) -> Option<&[LexerToken]> {
        self.analysis.as_ref().and_then(Analysis::tokens)
    }

    pub fn tree(&self) -> Option<&ParseNode> {
        self.analysis.as_ref().and_then(Analysis::tree)
    }

    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Parser rule names for labelling tree nodes.
    pub fn rule_names(&self) -> &[String] {
        match self.grammar() {
            Some(grammar) => grammar.rule_names(),
            None => &[],
        }
    }

    pub fn focus(&self) -> Option<Focus> {
        self.errors.focus()
    }
}

// ============================================================================
// INTERPRETER
// ============================================================================

/// Compiles and runs grammars with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    config: InterpreterConfig,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn interpret(&self, grammar_text: &str, input_text: &str) -> InterpretationResult {
        self.interpret_with(grammar_text, input_text, &CancellationToken::new())
    }

    /// Interprets on a worker thread with the configured stack size. Panics
    /// on the worker become a single UNKNOWN error.
    pub fn interpret_with(
        &self,
        grammar_text: &str,
        input_text: &str,
        cancel: &CancellationToken,
    ) -> InterpretationResult {
        let outcome = thread::scope(|scope| {
            let worker = thread::Builder::new()
                .name("headlights-worker".into())
                .stack_size(self.config.stack_size)
                .spawn_scoped(scope, || self.compute(grammar_text, input_text, cancel));
            match worker {
                Ok(handle) => handle.join().map_err(classify_panic),
                Err(error) => Err(ErrorMessage::unknown(format!("cannot start worker thread: {error}"))),
            }
        });
        outcome.unwrap_or_else(|message| {
            warn!("interpretation failed: {}", message.message);
            InterpretationResult::failed(None, vec![message].into())
        })
    }

    /// Interprets in the background. Dropping the returned job cancels it and
    /// discards the result.
    pub fn spawn(&self, grammar_text: String, input_text: String) -> std::io::Result<InterpretationJob> {
        let cancel = CancellationToken::new();
        let interpreter = self.clone();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("headlights-job".into())
            .spawn(move || interpreter.interpret_with(&grammar_text, &input_text, &token))?;
        Ok(InterpretationJob {
            handle: Some(handle),
            cancel,
        })
    }

    fn compute(&self, grammar_text: &str, input_text: &str, cancel: &CancellationToken) -> InterpretationResult {
        let mut compiler = Compiler::new();
        if let Some(start_rule) = &self.config.start_rule {
            compiler = compiler.start_rule(start_rule.clone());
        }
        let model = match compiler.compile_raw(grammar_text) {
            Ok(model) => Arc::new(model),
            Err(errors) => return InterpretationResult::failed(None, errors.iter().map(classify).collect()),
        };

        let options = RunOptions {
            max_depth: self.config.max_depth,
            cancel: cancel.clone(),
        };
        match runtime::run_with(&model, input_text, &options) {
            Ok((analysis, errors)) => {
                debug!("interpretation finished with {} error(s)", errors.len());
                InterpretationResult {
                    grammar: Some(model),
                    analysis: Some(analysis),
                    errors: errors.iter().map(classify).collect(),
                }
            }
            Err(fatal) => {
                if fatal.kind == ErrorKind::Cancelled {
                    warn!("interpretation cancelled");
                } else {
                    warn!("interpretation aborted: {}", fatal);
                }
                InterpretationResult::failed(Some(model), vec![classify(&fatal)].into())
            }
        }
    }
}

/// Compiles `grammar_text` and runs it over `input_text` with the default
/// configuration. Never fails: problems are reported in the result's errors.
pub fn interpret(grammar_text: &str, input_text: &str) -> InterpretationResult {
    Interpreter::default().interpret(grammar_text, input_text)
}

/// A background interpretation started by [`Interpreter::spawn`].
pub struct InterpretationJob {
    /// Taken by [`InterpretationJob::join`].
    handle: Option<thread::JoinHandle<InterpretationResult>>,
    cancel: CancellationToken,
}

impl InterpretationJob {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, thread::JoinHandle::is_finished)
    }

    pub fn join(mut self) -> InterpretationResult {
        let Some(handle) = self.handle.take() else {
            let message = ErrorMessage::unknown("interpretation job was already joined");
            return InterpretationResult::failed(None, vec![message].into());
        };
        handle
            .join()
            .unwrap_or_else(|payload| InterpretationResult::failed(None, vec![classify_panic(payload)].into()))
    }
}

impl Drop for InterpretationJob {
    fn drop(&mut self) {
        if self.handle.is_some() {
            debug!("interpretation job dropped before joining");
            self.cancel.cancel();
        }
    }
}

// ============================================================================
// RESULT CACHE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    grammar: String,
    input: String,
}

type ResultCell = Arc<OnceCell<Arc<InterpretationResult>>>;

#[derive(Debug, Default)]
struct CacheEntries {
    cells: HashMap<CacheKey, ResultCell>,
    /// Keys from least to most recently used.
    recency: VecDeque<CacheKey>,
}

impl CacheEntries {
    fn cell(&mut self, key: CacheKey, capacity: usize) -> ResultCell {
        if let Some(position) = self.recency.iter().position(|used| *used == key) {
            self.recency.remove(position);
        }
        let cell = Arc::clone(self.cells.entry(key.clone()).or_default());
        self.recency.push_back(key);
        while self.recency.len() > capacity {
            let Some(oldest) = self.recency.pop_front() else {
                break;
            };
            self.cells.remove(&oldest);
        }
        cell
    }
}

/// Memoizes interpretations by the exact text of both documents, keeping the
/// most recently used `capacity` results.
///
/// Concurrent requests for the same documents wait for a single computation.
/// An evicted computation still finishes for the callers already waiting on it.
#[derive(Debug)]
pub struct ResultCache {
    interpreter: Interpreter,
    capacity: usize,
    entries: Mutex<CacheEntries>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Interpreter::default())
    }
}

impl ResultCache {
    pub fn new(interpreter: Interpreter) -> Self {
        Self::with_capacity(interpreter, DEFAULT_CACHE_CAPACITY)
    }

    /// A cache holding at most `capacity` results (at least one).
    pub fn with_capacity(interpreter: Interpreter, capacity: usize) -> Self {
        Self {
            interpreter,
            capacity: capacity.max(1),
            entries: Mutex::new(CacheEntries::default()),
        }
    }

    pub fn interpret(&self, grammar_text: &str, input_text: &str) -> Arc<InterpretationResult> {
        let key = CacheKey {
            grammar: grammar_text.to_string(),
            input: input_text.to_string(),
        };
        let cell = self.lock().cell(key, self.capacity);
        Arc::clone(cell.get_or_init(|| {
            debug!("result cache miss");
            Arc::new(self.interpreter.interpret(grammar_text, input_text))
        }))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.cells.clear();
        entries.recency.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheEntries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorSource;

    #[test]
    fn lexer_only_grammars_produce_tokens() {
        let result = interpret("DIGITS : [0-9]+ ; WS : ' ' ;", "12 34");
        assert!(result.is_success());
        assert!(result.tree().is_none());
        assert_eq!(result.tokens().map(<[LexerToken]>::len), Some(3));
    }

    #[test]
    fn compile_errors_preempt_analysis() {
        let result = interpret("s : A", "a");
        assert!(result.analysis().is_none());
        assert!(result.grammar().is_none());
        assert!(result.errors().iter().all(|e| e.source == ErrorSource::Grammar));
    }

    #[test]
    fn recursion_limit_is_unknown_and_unpositioned() {
        let interpreter = Interpreter::new(InterpreterConfig::default().with_max_depth(2));
        let result = interpreter.interpret("s : '(' s ')' | 'x' ;", "(((x)))");
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].source, ErrorSource::Unknown);
        assert_eq!(result.errors()[0].line, -1);
        assert!(result.focus().is_none());
        assert!(result.analysis().is_none());
    }

    #[test]
    fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Interpreter::default().interpret_with("A : 'a' ;", "aaa", &cancel);
        assert_eq!(result.errors()[0].message, "interpretation cancelled");
    }

    #[test]
    fn cache_computes_once_per_key() {
        let cache = ResultCache::default();
        let first = cache.interpret("A : 'a' ;", "a");
        let second = cache.interpret("A : 'a' ;", "a");
        assert!(Arc::ptr_eq(&first, &second));
        cache.interpret("A : 'a' ;", "aa");
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_evicts_the_least_recently_used_result() {
        let cache = ResultCache::with_capacity(Interpreter::default(), 2);
        let a = cache.interpret("A : 'a' ;", "a");
        cache.interpret("A : 'a' ;", "aa");
        assert!(Arc::ptr_eq(&a, &cache.interpret("A : 'a' ;", "a")));
        cache.interpret("A : 'a' ;", "aaa");
        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&a, &cache.interpret("A : 'a' ;", "a")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn dropping_a_job_cancels_it() {
        let job = Interpreter::default()
            .spawn("A : 'a' ;".into(), "a".repeat(100_000))
            .unwrap();
        let token = job.cancellation_token();
        drop(job);
        assert!(token.is_cancelled());
    }

    #[test]
    fn background_jobs_join() {
        let job = Interpreter::default()
            .spawn("s : A+ ; A : 'a' ;".into(), "aaa".into())
            .unwrap();
        let result = job.join();
        assert!(result.is_success());
        assert_eq!(result.tree().map(|t| t.children().len()), Some(3));
    }
}
