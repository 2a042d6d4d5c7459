//! Ordered task pipelines.
//!
//! A [`Pipeline`] runs [`Task`]s against a scene root in the order given by
//! their dotted order strings. Tasks are collected by a [`PipelineBuilder`]:
//!
//! ```rust
//! use ddd::{builder, Edit, PipelineBuilder, Task};
//!
//! let mut pipeline = PipelineBuilder::new()
//!     .task(Task::run("load", |ctx| {
//!         ctx.root.append(&builder::rect("plot", [0.0, 0.0, 4.0, 4.0]))?;
//!         Ok(())
//!     }).order("10"))
//!     .task(Task::each("mark", |node, _| {
//!         node.set("osm:building", "yes");
//!         Ok(Edit::Keep)
//!     }).order("20").path("/plot"))
//!     .build()
//!     .unwrap();
//! pipeline.run().unwrap();
//! assert_eq!(pipeline.root.select_str("[osm:building]").unwrap().len(), 1);
//! ```
//!
//! Order components are numbers, `*` (the component of the previously
//! declared task) or `+` (one past the highest sibling declared so far).
//!
//! A `Condition` task that returns false skips every task ordered below it
//! (`30` skips `30.1` and `30.1.4`, not `40`). A `Cache` task names a file;
//! the scene and data are written there, and later runs resume after the
//! last cache whose file exists.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::Catalog;
use crate::meta::{MetaValue, Metadata};
use crate::node::Node;
use crate::selector::{Selector, SelectorError};
use crate::settings::Settings;
use crate::traverse::{Edit, SelectOptions};
use crate::{builder, persist, DddError, Result};

/// Resolved task order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Order(pub Vec<u32>);

impl Order {
    /// Parses a resolved order such as `30.1`.
    pub fn parse(text: &str) -> Result<Self> {
        text.split('.')
            .map(|c| c.trim().parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Order)
            .map_err(|_| DddError::Serialization(format!("invalid task order '{text}'")))
    }

    /// True when `self` is a proper prefix of `other`.
    pub fn is_strict_prefix_of(&self, other: &Order) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// State handed to task bodies.
pub struct TaskContext<'a> {
    /// Scene root; tasks may replace it.
    pub root: &'a mut Node,
    /// Pipeline data.
    pub data: &'a mut Metadata,
    /// Build settings.
    pub settings: &'a Settings,
    /// Prototype catalog.
    pub catalog: &'a mut Catalog,
    /// Parameters of the running task.
    pub params: &'a Metadata,
}

impl TaskContext<'_> {
    /// Task parameter, falling back to pipeline data.
    pub fn param(&self, key: &str) -> Option<&MetaValue> {
        self.params.get(key).or_else(|| self.data.get(key))
    }
}

type RunFn = Box<dyn FnMut(&mut TaskContext) -> Result<()>>;
type EachFn = Box<dyn FnMut(&Node, &mut TaskContext) -> Result<Edit>>;
type ConditionFn = Box<dyn FnMut(&mut TaskContext) -> Result<bool>>;
type CacheFn = Box<dyn FnMut(&mut TaskContext) -> Result<Option<PathBuf>>>;

/// What a task does.
pub enum TaskBody {
    /// Runs once against the root.
    Run(RunFn),
    /// Runs on every selected node; the returned edit is applied when the
    /// task replaces.
    Each(EachFn),
    /// Gates the tasks ordered below it.
    Condition(ConditionFn),
    /// Names the cache file for the state reached so far.
    Cache(CacheFn),
}

impl TaskBody {
    fn kind(&self) -> &'static str {
        match self {
            TaskBody::Run(_) => "run",
            TaskBody::Each(_) => "each",
            TaskBody::Condition(_) => "condition",
            TaskBody::Cache(_) => "cache",
        }
    }
}

/// A pipeline step.
pub struct Task {
    /// Task name.
    pub name: String,
    /// Dotted order, possibly with `*` and `+` components.
    pub order: String,
    /// Path prefix of selected nodes.
    pub path: Option<String>,
    /// Metadata selector of selected nodes.
    pub selector: Option<Selector>,
    /// Predicate on selected nodes.
    pub filter: Option<Rc<dyn Fn(&Node) -> bool>>,
    /// Descend into selected nodes.
    pub recurse: bool,
    /// Apply the edits returned by `Each` bodies.
    pub replace: bool,
    /// Runs before everything else and is never skipped by caches.
    pub init: bool,
    /// This cache is always rebuilt.
    pub cache_override: bool,
    /// Free-form parameters.
    pub params: Metadata,
    body: TaskBody,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("kind", &self.body.kind())
            .field("path", &self.path)
            .field("selector", &self.selector.as_ref().map(Selector::as_str))
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Task with the given body, ordered after the previous top-level task.
    pub fn new(name: impl Into<String>, body: TaskBody) -> Self {
        Self {
            name: name.into(),
            order: "+".to_string(),
            path: None,
            selector: None,
            filter: None,
            recurse: true,
            replace: true,
            init: false,
            cache_override: false,
            params: Metadata::new(),
            body,
        }
    }

    /// Root-level task.
    pub fn run(name: impl Into<String>, f: impl FnMut(&mut TaskContext) -> Result<()> + 'static) -> Self {
        Self::new(name, TaskBody::Run(Box::new(f)))
    }

    /// Per-node task.
    pub fn each(
        name: impl Into<String>,
        f: impl FnMut(&Node, &mut TaskContext) -> Result<Edit> + 'static,
    ) -> Self {
        Self::new(name, TaskBody::Each(Box::new(f)))
    }

    /// Condition task.
    pub fn condition(
        name: impl Into<String>,
        f: impl FnMut(&mut TaskContext) -> Result<bool> + 'static,
    ) -> Self {
        Self::new(name, TaskBody::Condition(Box::new(f)))
    }

    /// Cache task.
    pub fn cache(
        name: impl Into<String>,
        f: impl FnMut(&mut TaskContext) -> Result<Option<PathBuf>> + 'static,
    ) -> Self {
        Self::new(name, TaskBody::Cache(Box::new(f)))
    }

    /// Sets the order string.
    pub fn order(mut self, order: &str) -> Self {
        self.order = order.to_string();
        self
    }

    /// Restricts `Each` to a path prefix.
    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    /// Restricts `Each` to nodes matching `selector`.
    pub fn select(mut self, selector: &str) -> std::result::Result<Self, SelectorError> {
        self.selector = Some(Selector::parse(selector)?);
        Ok(self)
    }

    /// Restricts `Each` to nodes accepted by `f`.
    pub fn filter(mut self, f: impl Fn(&Node) -> bool + 'static) -> Self {
        self.filter = Some(Rc::new(f));
        self
    }

    /// Sets recursion into selected nodes.
    pub fn recurse(mut self, recurse: bool) -> Self {
        self.recurse = recurse;
        self
    }

    /// Sets whether `Each` edits are applied.
    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    /// Marks the task as an init task.
    pub fn init(mut self) -> Self {
        self.init = true;
        self
    }

    /// Never resume from this cache.
    pub fn cache_override(mut self) -> Self {
        self.cache_override = true;
        self
    }

    /// Sets a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn select_options(&self) -> SelectOptions {
        SelectOptions {
            selector: self.selector.clone(),
            path: self.path.clone(),
            filter: self.filter.clone(),
            recurse: self.recurse,
        }
    }
}

/// Resolves order strings in declaration order.
pub fn resolve_orders<'a>(specs: impl IntoIterator<Item = &'a str>) -> Result<Vec<Order>> {
    let mut resolved: Vec<Order> = Vec::new();
    for spec in specs {
        let mut parts = Vec::new();
        for (i, c) in spec.split('.').map(str::trim).enumerate() {
            let value = match c {
                "*" => resolved
                    .last()
                    .and_then(|prev| prev.0.get(i).copied())
                    .ok_or_else(|| {
                        DddError::Serialization(format!(
                            "order '{spec}': no previous task to copy component {i} from"
                        ))
                    })?,
                "+" => {
                    resolved
                        .iter()
                        .filter(|o| o.0.len() > i && o.0[..i] == parts[..])
                        .map(|o| o.0[i])
                        .max()
                        .unwrap_or(0)
                        + 1
                }
                n => n.parse::<u32>().map_err(|_| {
                    DddError::Serialization(format!("order '{spec}': invalid component '{n}'"))
                })?,
            };
            parts.push(value);
        }
        resolved.push(Order(parts));
    }
    Ok(resolved)
}

/// Wall-clock time of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskTiming {
    /// Task name.
    pub name: String,
    /// Resolved order.
    pub order: String,
    /// Elapsed seconds.
    pub seconds: f64,
}

/// Collects tasks and settings for a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    tasks: Vec<Task>,
    settings: Settings,
    root: Option<Node>,
    catalog: Option<Catalog>,
}

impl PipelineBuilder {
    /// Empty builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task.
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Adds several tasks in order.
    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Sets the build settings.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the initial root (an empty 2D group by default).
    pub fn root(mut self, root: Node) -> Self {
        self.root = Some(root);
        self
    }

    /// Sets the catalog (one in the settings' work directory by default).
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Resolves task orders and builds the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        let orders = resolve_orders(self.tasks.iter().map(|t| t.order.as_str()))?;
        let mut tasks: Vec<(Order, Task)> = orders.into_iter().zip(self.tasks).collect();
        // Stable: equal orders keep declaration order.
        tasks.sort_by(|a, b| a.0.cmp(&b.0));
        let catalog = self
            .catalog
            .unwrap_or_else(|| Catalog::from_settings(&self.settings));
        Ok(Pipeline {
            tasks,
            root: self.root.unwrap_or_else(|| builder::group2("root")),
            data: self.settings.data.clone(),
            settings: self.settings,
            catalog,
            clear_from: None,
            timings: Vec::new(),
        })
    }
}

/// A resolved, runnable sequence of tasks.
pub struct Pipeline {
    tasks: Vec<(Order, Task)>,
    /// Scene root.
    pub root: Node,
    /// Pipeline data.
    pub data: Metadata,
    /// Build settings.
    pub settings: Settings,
    /// Prototype catalog.
    pub catalog: Catalog,
    clear_from: Option<Order>,
    timings: Vec<TaskTiming>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("tasks", &self.tasks.len())
            .field("root", &self.root.name())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Resolved orders and names, in execution order.
    pub fn orders(&self) -> Vec<(Order, &str)> {
        self.tasks.iter().map(|(o, t)| (o.clone(), t.name.as_str())).collect()
    }

    /// One line per task: order, kind, name and selection.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (order, task) in &self.tasks {
            let mut line = format!("{:<12} {:<9} {}", order.to_string(), task.body.kind(), task.name);
            if task.init {
                line.push_str(" (init)");
            }
            if let Some(p) = &task.path {
                line.push_str(&format!(" path={p}"));
            }
            if let Some(s) = &task.selector {
                line.push_str(&format!(" select={s}"));
            }
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }

    /// Timings of the last run.
    pub fn timings(&self) -> &[TaskTiming] {
        &self.timings
    }

    /// Deletes the cache files of cache tasks ordered at or after `order`
    /// and never resumes from them in this pipeline. Returns the number of
    /// files removed.
    pub fn clear_cache_from(&mut self, order: &str) -> Result<usize> {
        let threshold = Order::parse(order)?;
        let mut removed = 0;
        for i in 0..self.tasks.len() {
            if self.tasks[i].0 < threshold || !matches!(self.tasks[i].1.body, TaskBody::Cache(_)) {
                continue;
            }
            if let Some(path) = self.cache_path(i)? {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                    info!(cache = %path.display(), "removed");
                    removed += 1;
                }
            }
        }
        self.clear_from = Some(threshold);
        Ok(removed)
    }

    fn cache_path(&mut self, index: usize) -> Result<Option<PathBuf>> {
        let (_, task) = &mut self.tasks[index];
        let TaskBody::Cache(f) = &mut task.body else {
            return Ok(None);
        };
        let mut ctx = TaskContext {
            root: &mut self.root,
            data: &mut self.data,
            settings: &self.settings,
            catalog: &mut self.catalog,
            params: &task.params,
        };
        f(&mut ctx)
    }

    /// Index after the last usable cache, after loading its state.
    fn resume(&mut self) -> usize {
        for i in (0..self.tasks.len()).rev() {
            let (order, task) = &self.tasks[i];
            if task.init || task.cache_override || !matches!(task.body, TaskBody::Cache(_)) {
                continue;
            }
            if self.clear_from.as_ref().is_some_and(|t| order >= t) {
                continue;
            }
            let path = match self.cache_path(i) {
                Ok(Some(p)) if p.exists() => p,
                Ok(_) => continue,
                Err(e) => {
                    warn!(task = %self.tasks[i].1.name, error = %e, "cache path not resolved");
                    continue;
                }
            };
            match persist::load(&path) {
                Ok((mut roots, data)) if roots.len() == 1 => {
                    self.root = roots.swap_remove(0);
                    self.data = data;
                    info!(cache = %path.display(), task = %self.tasks[i].1.name, "resuming from cache");
                    return i + 1;
                }
                Ok(_) => warn!(cache = %path.display(), "cache holds several roots, ignored"),
                Err(e) => warn!(cache = %path.display(), error = %e, "cache not loaded"),
            }
        }
        0
    }

    /// Runs every task.
    ///
    /// # Errors
    ///
    /// The first failing task aborts the run with [`DddError::Task`];
    /// caches written before it stay valid.
    pub fn run(&mut self) -> Result<()> {
        self.timings.clear();
        let started = Instant::now();

        for i in 0..self.tasks.len() {
            if self.tasks[i].1.init {
                self.run_task(i)?;
            }
        }

        let start = self.resume();
        let mut skipped: Vec<Order> = Vec::new();
        for i in start..self.tasks.len() {
            let (order, task) = &self.tasks[i];
            if task.init {
                continue;
            }
            if let Some(cond) = skipped.iter().find(|c| c.is_strict_prefix_of(order)) {
                debug!(task = %task.name, %order, condition = %cond, "skipped by condition");
                continue;
            }
            if !self.run_task(i)? {
                skipped.push(self.tasks[i].0.clone());
            }
        }
        info!(
            tasks = self.timings.len(),
            seconds = started.elapsed().as_secs_f64(),
            "pipeline finished"
        );
        Ok(())
    }

    /// Runs one task; returns the condition outcome (true for other kinds).
    fn run_task(&mut self, index: usize) -> Result<bool> {
        let name = self.tasks[index].1.name.clone();
        let order = self.tasks[index].0.clone();
        let t0 = Instant::now();
        let outcome = self.execute(index).map_err(|e| {
            error!(task = %name, %order, error = %e, "task failed");
            DddError::Task {
                task: name.clone(),
                source: Box::new(e),
            }
        })?;
        self.timings.push(TaskTiming {
            name,
            order: order.to_string(),
            seconds: t0.elapsed().as_secs_f64(),
        });
        Ok(outcome)
    }

    #[instrument(skip(self), fields(task = %self.tasks[index].1.name, order = %self.tasks[index].0))]
    fn execute(&mut self, index: usize) -> Result<bool> {
        let cache_ro = self.settings.cache_ro;
        let (_, task) = &mut self.tasks[index];
        let options = task.select_options();
        let replace = task.replace;
        let mut ctx = TaskContext {
            root: &mut self.root,
            data: &mut self.data,
            settings: &self.settings,
            catalog: &mut self.catalog,
            params: &task.params,
        };
        match &mut task.body {
            TaskBody::Run(f) => f(&mut ctx)?,
            TaskBody::Each(f) => {
                let root = ctx.root.clone();
                let n = root.select_apply(&options, |node| {
                    let edit = f(node, &mut ctx)?;
                    Ok(if replace { edit } else { Edit::Keep })
                })?;
                debug!(selected = n, "applied");
            }
            TaskBody::Condition(f) => {
                let pass = f(&mut ctx)?;
                debug!(pass, "condition");
                return Ok(pass);
            }
            TaskBody::Cache(f) => {
                if let Some(path) = f(&mut ctx)? {
                    if cache_ro {
                        debug!(cache = %path.display(), "read-only cache, not written");
                    } else {
                        persist::save(&path, &[&*ctx.root], ctx.data)?;
                        info!(cache = %path.display(), "cache written");
                    }
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    fn logging(log: &Log, name: &str) -> Task {
        let log = log.clone();
        let label = name.to_string();
        Task::run(name, move |_| {
            log.borrow_mut().push(label.clone());
            Ok(())
        })
    }

    fn orders(p: &Pipeline) -> Vec<String> {
        p.orders().iter().map(|(o, _)| o.to_string()).collect()
    }

    #[test]
    fn test_order_resolution() {
        let log = Log::default();
        let p = PipelineBuilder::new()
            .task(logging(&log, "d").order("20"))
            .task(logging(&log, "a").order("10"))
            .task(logging(&log, "b").order("10.5"))
            .task(logging(&log, "c").order("*.+"))
            .build()
            .unwrap();
        assert_eq!(orders(&p), ["10", "10.5", "10.6", "20"]);
        let names: Vec<&str> = p.orders().iter().map(|(_, n)| *n).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_declared_sequence_resolves() {
        let resolved = resolve_orders(["10", "10.5", "*.+", "20"]).unwrap();
        let expected = [vec![10], vec![10, 5], vec![10, 6], vec![20]];
        assert_eq!(resolved, expected.map(Order));
        assert_eq!(resolve_orders(["+", "+", "5.+"]).unwrap(), [Order(vec![1]), Order(vec![2]), Order(vec![5, 1])]);
        assert!(resolve_orders(["*"]).is_err());
        assert!(resolve_orders(["1.x"]).is_err());
    }

    #[test]
    fn test_condition_skips_strict_descendants() {
        let log = Log::default();
        let mut p = PipelineBuilder::new()
            .task(Task::condition("gate", |_| Ok(false)).order("30"))
            .task(logging(&log, "inner").order("30.1"))
            .task(logging(&log, "deep").order("30.1.2"))
            .task(logging(&log, "after").order("40"))
            .build()
            .unwrap();
        p.run().unwrap();
        assert_eq!(*log.borrow(), ["after"]);
    }

    #[test]
    fn test_each_applies_edits() {
        let root = builder::group2("city");
        for (i, ignore) in [false, true, false].into_iter().enumerate() {
            let b = builder::rect(&format!("b{i}"), [0.0, 0.0, 1.0, 1.0]);
            b.set("osm:building", "yes");
            if ignore {
                b.set("ddd:ignore", true);
            }
            root.append(&b).unwrap();
        }
        let mut p = PipelineBuilder::new()
            .root(root)
            .task(
                Task::each("drop-ignored", |_, _| Ok(Edit::Remove))
                    .select("[ddd:ignore]")
                    .unwrap(),
            )
            .task(
                Task::each("height", |n, ctx| {
                    let h = ctx.param("ddd:height").and_then(MetaValue::as_f64).unwrap_or(0.0);
                    n.set("ddd:height", h);
                    Ok(Edit::Keep)
                })
                .select("[osm:building]")
                .unwrap()
                .param("ddd:height", 9.0),
            )
            .build()
            .unwrap();
        p.run().unwrap();
        assert_eq!(p.root.num_children(), 2);
        let heights: Vec<f64> = p
            .root
            .select_str("[ddd:height]")
            .unwrap()
            .iter()
            .filter_map(|n| n.get("ddd:height")?.as_f64())
            .collect();
        assert_eq!(heights, [9.0, 9.0]);
    }

    #[test]
    fn test_replace_false_discards_edits() {
        let root = builder::group2("r");
        root.append(&builder::rect("a", [0.0, 0.0, 1.0, 1.0])).unwrap();
        let mut p = PipelineBuilder::new()
            .root(root)
            .task(Task::each("noop", |_, _| Ok(Edit::Remove)).path("/a").replace(false))
            .build()
            .unwrap();
        p.run().unwrap();
        assert_eq!(p.root.num_children(), 1);
    }

    fn cached_pipeline(dir: &std::path::Path, log: &Log, fail: bool) -> Pipeline {
        let cache = dir.join("scene.s10.cache");
        PipelineBuilder::new()
            .task(logging(log, "setup").init().order("1"))
            .task({
                let log = log.clone();
                Task::run("generate", move |ctx| {
                    log.borrow_mut().push("generate".into());
                    ctx.root.append(&builder::rect("plot", [0.0, 0.0, 2.0, 2.0]))?;
                    ctx.data.insert("ddd:generated".into(), true.into());
                    Ok(())
                })
                .order("5")
            })
            .task(Task::cache("cache", move |_| Ok(Some(cache.clone()))).order("10"))
            .task({
                let log = log.clone();
                Task::run("finish", move |ctx| {
                    log.borrow_mut().push("finish".into());
                    if fail {
                        return Err(DddError::MissingMetadata {
                            key: "ddd:height".into(),
                            node: Some(ctx.root.summary()),
                        });
                    }
                    Ok(())
                })
                .order("20")
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_resume_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let err = cached_pipeline(dir.path(), &log, true).run().unwrap_err();
        assert!(matches!(&err, DddError::Task { task, .. } if task == "finish"));
        assert!(dir.path().join("scene.s10.cache").exists());
        assert_eq!(*log.borrow(), ["setup", "generate", "finish"]);

        log.borrow_mut().clear();
        let mut p = cached_pipeline(dir.path(), &log, false);
        p.run().unwrap();
        assert_eq!(*log.borrow(), ["setup", "finish"]);
        assert!(p.root.find("plot").is_some());
        assert_eq!(p.data.get("ddd:generated"), Some(&MetaValue::Bool(true)));
        assert_eq!(p.timings().len(), 2);

        log.borrow_mut().clear();
        let mut p = cached_pipeline(dir.path(), &log, false);
        assert_eq!(p.clear_cache_from("10").unwrap(), 1);
        p.run().unwrap();
        assert_eq!(*log.borrow(), ["setup", "generate", "finish"]);
    }

    #[test]
    fn test_read_only_cache_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log::default();
        let mut p = cached_pipeline(dir.path(), &log, false);
        p.settings.cache_ro = true;
        p.run().unwrap();
        assert!(!dir.path().join("scene.s10.cache").exists());
    }

    #[test]
    fn test_describe() {
        let p = PipelineBuilder::new()
            .task(Task::each("roads", |_, _| Ok(Edit::Keep)).order("30").select("[osm:highway]").unwrap())
            .task(Task::condition("has-roads", |_| Ok(true)).order("30.1"))
            .build()
            .unwrap();
        let text = p.describe();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("30 "));
        assert!(lines[0].contains("each") && lines[0].ends_with("select=[osm:highway]"));
        assert!(lines[1].contains("condition") && lines[1].contains("has-roads"));
    }
}
