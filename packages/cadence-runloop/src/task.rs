use crate::error::{Result, RunLoopError};
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Argument list of an invocation. Most calls carry zero to a few values.
pub type Args = SmallVec<[Value; 4]>;

pub type TargetRef = Rc<dyn Target>;

type MethodFn = dyn Fn(Option<&TargetRef>, &[Value]) -> anyhow::Result<()>;

/// A receiver that invocations can be bound to.
///
/// `resolve` is the typed lookup table used for name-based dispatch
/// (`Task::on(target, "destroy")`). It runs once, when the task is
/// scheduled, never when it executes.
pub trait Target {
    fn resolve(self: Rc<Self>, _name: &str) -> Option<Method> {
        None
    }
}

/// A callable. Two `Method`s are the same method (for deduplication) only if
/// one is a clone of the other.
#[derive(Clone)]
pub struct Method(Rc<MethodFn>);

impl Method {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&TargetRef>, &[Value]) -> anyhow::Result<()> + 'static,
    {
        Self(Rc::new(f))
    }

    /// A method that ignores receiver and arguments and cannot fail.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::new(move |_, _| {
            f();
            Ok(())
        })
    }

    pub fn call(&self, target: Option<&TargetRef>, args: &[Value]) -> anyhow::Result<()> {
        (self.0)(target, args)
    }

    fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({:#x})", self.id())
    }
}

#[derive(Clone, Debug)]
pub enum MethodRef {
    Func(Method),
    Named(String),
}

impl From<Method> for MethodRef {
    fn from(m: Method) -> Self {
        MethodRef::Func(m)
    }
}

impl From<&Method> for MethodRef {
    fn from(m: &Method) -> Self {
        MethodRef::Func(m.clone())
    }
}

impl From<&str> for MethodRef {
    fn from(name: &str) -> Self {
        MethodRef::Named(name.to_string())
    }
}

impl From<String> for MethodRef {
    fn from(name: String) -> Self {
        MethodRef::Named(name)
    }
}

/// An unresolved request to call `method` (on `target`, with `args`).
///
/// ```
/// use cadence_runloop::{Method, Task};
///
/// let log = Method::from_fn(|| println!("flushed"));
/// let task = Task::new(&log).arg(1).arg("two");
/// assert_eq!(task.arg_count(), 2);
/// ```
#[derive(Clone)]
pub struct Task {
    target: Option<TargetRef>,
    method: MethodRef,
    args: Args,
}

impl Task {
    pub fn new(method: impl Into<MethodRef>) -> Self {
        Self {
            target: None,
            method: method.into(),
            args: Args::new(),
        }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self::new(Method::from_fn(f))
    }

    pub fn on(target: TargetRef, method: impl Into<MethodRef>) -> Self {
        Self::new(method).with_target(target)
    }

    pub fn with_target(mut self, target: TargetRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Looks the method up and freezes the call.
    pub(crate) fn resolve(self) -> Result<Invocation> {
        let Task {
            target,
            method,
            args,
        } = self;

        let (method_key, method) = match method {
            MethodRef::Func(m) => (MethodKey::Func(m.clone()), m),
            MethodRef::Named(name) => {
                let found = target.as_ref().and_then(|t| Rc::clone(t).resolve(&name));
                match found {
                    Some(m) => (MethodKey::Named(name), m),
                    None => return Err(RunLoopError::InvalidMethod { name }),
                }
            }
        };

        let key = InvocationKey {
            target: target.clone(),
            method: method_key,
        };

        Ok(Invocation {
            target,
            method,
            args,
            key,
        })
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("target", &self.target.as_ref().map(target_id))
            .field("method", &self.method)
            .field("args", &self.args)
            .finish()
    }
}

#[derive(Clone, Debug)]
enum MethodKey {
    Func(Method),
    Named(String),
}

impl PartialEq for MethodKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MethodKey::Func(a), MethodKey::Func(b)) => a.id() == b.id(),
            (MethodKey::Named(a), MethodKey::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for MethodKey {}

impl Hash for MethodKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            MethodKey::Func(m) => {
                0u8.hash(state);
                m.id().hash(state);
            }
            MethodKey::Named(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

/// Identity of a (target, method) pair, used for `schedule_once`,
/// `debounce` and `throttle`.
///
/// Compared by address, so the key holds the target and closure it names.
/// An address cannot be handed to another allocation while a key for it is
/// still stored in a queue or rate-limiter map.
#[derive(Clone)]
pub struct InvocationKey {
    target: Option<TargetRef>,
    method: MethodKey,
}

impl PartialEq for InvocationKey {
    fn eq(&self, other: &Self) -> bool {
        self.target.as_ref().map(target_id) == other.target.as_ref().map(target_id) && self.method == other.method
    }
}

impl Eq for InvocationKey {}

impl Hash for InvocationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.as_ref().map(target_id).hash(state);
        self.method.hash(state);
    }
}

impl fmt::Debug for InvocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationKey")
            .field("target", &self.target.as_ref().map(target_id))
            .field("method", &self.method)
            .finish()
    }
}

/// A resolved, ready-to-run call.
#[derive(Clone)]
pub struct Invocation {
    target: Option<TargetRef>,
    method: Method,
    args: Args,
    key: InvocationKey,
}

impl Invocation {
    pub fn target(&self) -> Option<&TargetRef> {
        self.target.as_ref()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn key(&self) -> &InvocationKey {
        &self.key
    }

    pub(crate) fn replace_args(&mut self, args: Args) {
        self.args = args;
    }

    pub(crate) fn into_args(self) -> Args {
        self.args
    }

    pub(crate) fn invoke(&self) -> Result<()> {
        self.method
            .call(self.target.as_ref(), &self.args)
            .map_err(RunLoopError::Invocation)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("key", &self.key)
            .field("args", &self.args)
            .finish()
    }
}

fn target_id(target: &TargetRef) -> usize {
    Rc::as_ptr(target) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        hits: Cell<u32>,
    }

    impl Target for Counter {
        fn resolve(self: Rc<Self>, name: &str) -> Option<Method> {
            match name {
                "hit" => Some(Method::new(move |_, _| {
                    self.hits.set(self.hits.get() + 1);
                    Ok(())
                })),
                _ => None,
            }
        }
    }

    #[test]
    fn named_methods_resolve_against_target() {
        let counter = Rc::new(Counter { hits: Cell::new(0) });
        let target: TargetRef = counter.clone();

        let inv = Task::on(target, "hit").resolve().unwrap();
        inv.invoke().unwrap();
        assert_eq!(counter.hits.get(), 1);
    }

    #[test]
    fn unknown_name_fails_fast() {
        let target: TargetRef = Rc::new(Counter { hits: Cell::new(0) });
        let err = Task::on(target, "missing").resolve().unwrap_err();
        assert!(matches!(err, RunLoopError::InvalidMethod { name } if name == "missing"));

        // A name without a receiver has nothing to look up on.
        let err = Task::new("hit").resolve().unwrap_err();
        assert!(matches!(err, RunLoopError::InvalidMethod { .. }));
    }

    #[test]
    fn keys_follow_method_identity() {
        let m = Method::from_fn(|| {});
        let a = Task::new(&m).arg(1).resolve().unwrap();
        let b = Task::new(&m).arg(2).resolve().unwrap();
        let c = Task::from_fn(|| {}).resolve().unwrap();
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());

        let target: TargetRef = Rc::new(Counter { hits: Cell::new(0) });
        let x = Task::on(target.clone(), "hit").resolve().unwrap();
        let y = Task::on(target, "hit").resolve().unwrap();
        assert_eq!(x.key(), y.key());
    }

    #[test]
    fn stored_key_outlives_its_invocation() {
        let key = Task::from_fn(|| {}).resolve().unwrap().key().clone();
        // The first closure is only reachable through `key` now, so this
        // allocation cannot reuse its address.
        let other = Task::from_fn(|| {}).resolve().unwrap();
        assert_ne!(&key, other.key());
    }
}
