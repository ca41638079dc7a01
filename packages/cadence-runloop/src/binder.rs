use crate::error::Result;
use crate::scheduler::{Scheduler, WeakScheduler};
use crate::task::{Args, Invocation, Task, TargetRef};
use serde_json::Value;

/// A method with its receiver and leading arguments fixed.
#[derive(Clone, Debug)]
pub struct Bound {
    invocation: Invocation,
    scheduler: Option<WeakScheduler>,
}

/// Resolves `task` once and returns a plain callable.
///
/// The task's own arguments become the leading arguments of every call.
pub fn bind(task: Task) -> Result<Bound> {
    Ok(Bound {
        invocation: task.resolve()?,
        scheduler: None,
    })
}

impl Bound {
    /// Routes calls through `scheduler.join`, so side effects land in its
    /// current loop. Calls made after the scheduler is dropped run directly.
    pub fn joined(mut self, scheduler: &Scheduler) -> Self {
        self.scheduler = Some(scheduler.downgrade());
        self
    }

    pub fn target(&self) -> Option<&TargetRef> {
        self.invocation.target()
    }

    pub fn call(&self) -> Result<()> {
        self.call_with(std::iter::empty::<Value>())
    }

    pub fn call_with<I, V>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut full: Args = self.invocation.args().iter().cloned().collect();
        full.extend(args.into_iter().map(Into::into));

        let mut invocation = self.invocation.clone();
        invocation.replace_args(full);

        match self.scheduler.as_ref().and_then(WeakScheduler::upgrade) {
            Some(scheduler) => scheduler.join_invocation(invocation),
            None => invocation.invoke(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Method, Target};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Editor;
    impl Target for Editor {}

    #[test]
    fn pre_applied_args_come_first() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let method = {
            let seen = seen.clone();
            Method::new(move |_, args| {
                seen.borrow_mut().extend(args.iter().cloned());
                Ok(())
            })
        };

        let bound = bind(Task::new(method).arg("a")).unwrap();
        bound.call_with(["b", "c"]).unwrap();
        bound.call().unwrap();

        assert_eq!(*seen.borrow(), vec![Value::from("a"), Value::from("b"), Value::from("c"), Value::from("a")]);
    }

    #[test]
    fn receiver_is_the_bound_target() {
        let obj: TargetRef = Rc::new(Editor);
        let hit = Rc::new(RefCell::new(false));
        let method = {
            let obj = obj.clone();
            let hit = hit.clone();
            Method::new(move |this, _| {
                *hit.borrow_mut() = this.is_some_and(|t| Rc::ptr_eq(t, &obj));
                Ok(())
            })
        };

        bind(Task::on(obj.clone(), method)).unwrap().call().unwrap();
        assert!(*hit.borrow());
    }
}
