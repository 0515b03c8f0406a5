//! The interpreter instance and its execution handle.
//!
//! An [`Interpreter`] owns the global frame, the `defun` registry, the input
//! broker and the host. [`Interpreter::execute`] runs a batch of top-level
//! forms and returns an [`Execution`]: a future that is only ever pending on
//! the broker, which a host can either await or drive with
//! [`Execution::step`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use serde_json::Value as JsonValue;

use crate::Error;
use crate::ast::{Form, UserFunction, Value};
use crate::broker::{InputBroker, InputFuture, InputKind, InputRequest};
use crate::config::InterpreterConfig;
use crate::environment::Environment;
use crate::evaluator::eval;
use crate::host::{Host, LogStyle, Point};
use crate::lexer::tokenize;
use crate::parser::parse_with_depth;

pub struct Interpreter {
    pub(crate) globals: Environment,
    pub(crate) functions: HashMap<String, Rc<UserFunction>>,
    pub(crate) broker: InputBroker,
    pub(crate) host: Box<dyn Host>,
    pub(crate) config: InterpreterConfig,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("globals", &self.globals)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("broker", &self.broker)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    pub fn new(host: impl Host + 'static) -> Self {
        Self::with_config(host, InterpreterConfig::default())
    }

    pub fn with_config(host: impl Host + 'static, config: InterpreterConfig) -> Self {
        Interpreter {
            globals: Environment::new(),
            functions: HashMap::new(),
            broker: InputBroker::new(),
            host: Box::new(host),
            config,
        }
    }

    /// Handle on the pending-input slot; clones can be kept by the host UI
    pub fn broker(&self) -> &InputBroker {
        &self.broker
    }

    pub fn globals(&self) -> &Environment {
        &self.globals
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// A function registered with `defun`
    pub fn function(&self, name: &str) -> Option<&UserFunction> {
        self.functions.get(&name.to_uppercase()).map(Rc::as_ref)
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn Host {
        self.host.as_mut()
    }

    /// Show the prompt and open a broker request
    pub(crate) fn request_input(
        &mut self,
        kind: InputKind,
        prompt: String,
        base_point: Option<Point>,
    ) -> InputFuture {
        if !prompt.is_empty() {
            self.host.log(&prompt, LogStyle::Prompt);
        }
        self.broker.request(kind, prompt, base_point)
    }

    fn parse(&self, source: &str) -> Result<Vec<Form>, Error> {
        parse_with_depth(&tokenize(source)?, self.config.max_parse_depth)
    }

    /// Each top-level form gets a fresh local frame. The first error stops the
    /// batch; effects of the forms before it are kept.
    async fn eval_forms(&mut self, forms: &[Form]) -> Result<Value, Error> {
        let mut result = Value::Nil;
        for form in forms {
            log::debug!("eval {form}");
            let mut env = Environment::new();
            result = eval(self, form, &mut env, 0).await?;
        }
        Ok(result)
    }

    /// Evaluate every form of `source`, returning the last value or the first error
    pub async fn eval_str(&mut self, source: &str) -> Result<Value, Error> {
        let forms = self.parse(source)?;
        self.eval_forms(&forms).await
    }

    /// Run a script batch. Errors are reported to the host log and the batch
    /// then yields nil, so the returned future never fails.
    pub fn execute(&mut self, source: &str) -> Execution<'_> {
        let parsed = self.parse(source);
        let broker = self.broker.clone();

        let future = Box::pin(async move {
            let outcome = match parsed {
                Ok(forms) => self.eval_forms(&forms).await,
                Err(err) => Err(err),
            };
            self.report(outcome)
        });

        Execution {
            future: Some(future),
            outcome: None,
            broker,
        }
    }

    fn report(&mut self, outcome: Result<Value, Error>) -> Value {
        match outcome {
            Ok(value) => {
                if self.config.echo_result {
                    self.host.log(&value.to_string(), LogStyle::Result);
                }
                value
            }
            Err(err) => {
                log::warn!("script aborted: {err}");
                self.host.log(&format!("Error: {err}"), LogStyle::Error);
                Value::Nil
            }
        }
    }

    /// Evaluate without an executor, for scripts that never ask for input
    #[cfg(test)]
    pub(crate) fn eval_now(&mut self, source: &str) -> Result<Value, Error> {
        let mut future = std::pin::pin!(self.eval_str(source));
        match future.as_mut().poll(&mut Context::from_waker(Waker::noop())) {
            Poll::Ready(result) => result,
            Poll::Pending => panic!("{source:?} is waiting for input"),
        }
    }
}

/// Where an [`Execution`] stands after being polled
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Finished(Value),
    /// Suspended until the host answers this request
    AwaitingInput(InputRequest),
    /// Suspended with no request pending
    Stalled,
}

/// A running script batch.
///
/// Dropping an unfinished execution drops the suspended evaluation and cancels
/// its pending request.
pub struct Execution<'a> {
    future: Option<Pin<Box<dyn Future<Output = Value> + 'a>>>,
    outcome: Option<Value>,
    broker: InputBroker,
}

impl Execution<'_> {
    /// Poll once without an executor
    pub fn step(&mut self) -> Step {
        if let Some(value) = &self.outcome {
            return Step::Finished(value.clone());
        }
        let Some(future) = self.future.as_mut() else {
            return Step::Stalled;
        };

        let mut cx = Context::from_waker(Waker::noop());
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(value) => {
                self.future = None;
                self.outcome = Some(value.clone());
                Step::Finished(value)
            }
            Poll::Pending => match self.broker.pending() {
                Some(request) => Step::AwaitingInput(request),
                None => Step::Stalled,
            },
        }
    }

    /// Answer the pending request and run until the next suspension
    pub fn resolve_input(&mut self, raw: JsonValue) -> Step {
        self.broker.resolve(raw);
        self.step()
    }

    /// Cancel the pending request (the builtin receives nil) and keep running
    pub fn cancel_input(&mut self) -> Step {
        self.broker.cancel();
        self.step()
    }

    pub fn pending_input(&self) -> Option<InputRequest> {
        self.broker.pending()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }
}

impl Future for Execution<'_> {
    type Output = Value;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Value> {
        if let Some(value) = self.outcome.clone() {
            return Poll::Ready(value);
        }
        let Some(future) = self.future.as_mut() else {
            return Poll::Ready(Value::Nil);
        };
        match future.as_mut().poll(cx) {
            Poll::Ready(value) => {
                self.future = None;
                self.outcome = Some(value.clone());
                Poll::Ready(value)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Execution<'_> {
    fn drop(&mut self) {
        if self.future.take().is_some() && self.broker.is_pending() {
            log::debug!("unfinished execution dropped, cancelling its input request");
            self.broker.cancel();
        }
    }
}

impl std::fmt::Debug for Execution<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("finished", &self.outcome.is_some())
            .field("pending", &self.broker.pending())
            .finish()
    }
}
