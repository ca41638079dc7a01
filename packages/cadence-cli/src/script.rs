use crate::host::Host;
use anyhow::{Context, Result, bail};
use cadence_runloop::{Handle, Method, Scheduler, SchedulerConfig, Target, TargetRef, Task, Value};
use serde::Deserialize;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Deserialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

/// The method, receiver and arguments of a scripted call. Calls with the
/// same `label` (and `target`) share a method, so they dedupe, debounce and
/// throttle together.
#[derive(Debug, Deserialize)]
pub struct Call {
    pub label: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Schedule {
        queue: String,
        #[serde(flatten)]
        call: Call,
        handle: Option<String>,
    },
    ScheduleOnce {
        queue: String,
        #[serde(flatten)]
        call: Call,
        handle: Option<String>,
    },
    Once {
        #[serde(flatten)]
        call: Call,
        handle: Option<String>,
    },
    Later {
        #[serde(flatten)]
        call: Call,
        wait: u64,
        handle: Option<String>,
    },
    Next {
        #[serde(flatten)]
        call: Call,
        handle: Option<String>,
    },
    Throttle {
        #[serde(flatten)]
        call: Call,
        wait: u64,
        #[serde(default = "immediate_throttle")]
        immediate: bool,
        handle: Option<String>,
    },
    Debounce {
        #[serde(flatten)]
        call: Call,
        wait: u64,
        #[serde(default)]
        immediate: bool,
        handle: Option<String>,
    },
    Cancel {
        handle: String,
    },
    Advance {
        ms: u64,
    },
    Tick,
    Run {
        steps: Vec<Step>,
    },
}

fn immediate_throttle() -> bool {
    true
}

/// Receiver for scripted calls; only its identity matters.
struct Actor;

impl Target for Actor {}

pub struct Runner {
    scheduler: Scheduler,
    host: Host,
    methods: HashMap<String, Method>,
    targets: HashMap<String, TargetRef>,
    handles: HashMap<String, Handle>,
    fired: Rc<Cell<usize>>,
}

impl Runner {
    pub fn new(config: SchedulerConfig, host: Host) -> Result<Self> {
        let scheduler = Scheduler::with_config(config, host.clock())?;
        Ok(Self {
            scheduler,
            host,
            methods: HashMap::new(),
            targets: HashMap::new(),
            handles: HashMap::new(),
            fired: Rc::new(Cell::new(0)),
        })
    }

    pub fn fired(&self) -> usize {
        self.fired.get()
    }

    /// Runs every step, then lets the host drain outstanding timers.
    pub async fn execute(&mut self, script: &Script) -> Result<()> {
        for (i, step) in script.steps.iter().enumerate() {
            match step {
                Step::Advance { ms } => self.host.advance(&self.scheduler, *ms).await?,
                Step::Tick => {
                    self.scheduler.tick()?;
                }
                other => self
                    .apply(other)
                    .with_context(|| format!("step {} failed", i + 1))?,
            }
        }
        self.host.drain(&self.scheduler).await
    }

    fn apply(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Schedule { queue, call, handle } => {
                let task = self.task(call);
                let h = self.scheduler.schedule(queue, task)?;
                self.remember(handle, h);
            }
            Step::ScheduleOnce { queue, call, handle } => {
                let task = self.task(call);
                let h = self.scheduler.schedule_once(queue, task)?;
                self.remember(handle, h);
            }
            Step::Once { call, handle } => {
                let task = self.task(call);
                let h = self.scheduler.once(task)?;
                self.remember(handle, h);
            }
            Step::Later { call, wait, handle } => {
                let task = self.task(call);
                let h = self.scheduler.later(task, *wait)?;
                self.remember(handle, h);
            }
            Step::Next { call, handle } => {
                let task = self.task(call);
                let h = self.scheduler.next(task)?;
                self.remember(handle, h);
            }
            Step::Throttle {
                call,
                wait,
                immediate,
                handle,
            } => {
                let task = self.task(call);
                let h = self.scheduler.throttle(task, *wait, *immediate)?;
                self.remember(handle, h);
            }
            Step::Debounce {
                call,
                wait,
                immediate,
                handle,
            } => {
                let task = self.task(call);
                let h = self.scheduler.debounce(task, *wait, *immediate)?;
                self.remember(handle, h);
            }
            Step::Cancel { handle } => {
                let h = *self
                    .handles
                    .get(handle)
                    .with_context(|| format!("unknown handle `{}`", handle))?;
                let cancelled = self.scheduler.cancel(h);
                println!("{:>6}ms  cancel {} -> {}", self.scheduler.now(), handle, cancelled);
            }
            Step::Run { steps } => {
                let scheduler = self.scheduler.clone();
                scheduler.run(|| -> Result<()> {
                    for step in steps {
                        self.apply(step)?;
                    }
                    Ok(())
                })??;
            }
            Step::Advance { .. } | Step::Tick => {
                bail!("`advance` and `tick` are turn boundaries and cannot appear inside `run`")
            }
        }
        Ok(())
    }

    fn task(&mut self, call: &Call) -> Task {
        let task = Task::new(self.method(&call.label)).args(call.args.iter().cloned());
        match &call.target {
            Some(name) => task.with_target(self.target(name)),
            None => task,
        }
    }

    fn method(&mut self, label: &str) -> Method {
        let scheduler = self.scheduler.clone();
        let fired = self.fired.clone();
        self.methods
            .entry(label.to_string())
            .or_insert_with(|| {
                let label = label.to_string();
                Method::new(move |_, args| {
                    fired.set(fired.get() + 1);
                    if args.is_empty() {
                        println!("{:>6}ms  {}", scheduler.now(), label);
                    } else {
                        println!("{:>6}ms  {} {}", scheduler.now(), label, Value::from(args.to_vec()));
                    }
                    Ok(())
                })
            })
            .clone()
    }

    fn target(&mut self, name: &str) -> TargetRef {
        self.targets
            .entry(name.to_string())
            .or_insert_with(|| -> TargetRef { Rc::new(Actor) })
            .clone()
    }

    fn remember(&mut self, name: &Option<String>, handle: impl Into<Handle>) {
        if let Some(name) = name {
            self.handles.insert(name.clone(), handle.into());
        }
    }
}
