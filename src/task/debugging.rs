use std::{cell::RefCell, collections::HashMap, time::Instant};

use super::TaskId;

thread_local! {
    static DEBUGGER: RefCell<Option<TaskDebugger>> = const { RefCell::new(None) };
}

/// Per-thread registry of tasks selected for lifecycle tracing.
///
/// Tasks that pass the filter (by default: tasks with a label) get every lifecycle step they go
/// through logged at debug level, tagged with the step's context stack. Several executors may
/// share a thread, so entries are keyed by executor id and task id.
pub struct TaskDebugger {
    registry: HashMap<(usize, TaskId), TaskInfo>,
    filter: fn(Option<&'static str>) -> bool,
    task_count: usize,
    current_task: Option<TaskId>,
    context: Vec<&'static str>,
}

#[derive(Debug)]
struct TaskInfo {
    executor: usize,
    id: TaskId,
    label: Option<&'static str>,
    ts: Instant,
}

#[cfg(not(feature = "debugging"))]
fn has_label(label: Option<&'static str>) -> bool {
    label.is_some()
}

#[cfg(feature = "debugging")]
fn any_task(_: Option<&'static str>) -> bool {
    true
}

impl TaskInfo {
    fn new(executor: usize, id: TaskId, label: Option<&'static str>) -> Self {
        Self {
            executor,
            id,
            label,
            ts: Instant::now(),
        }
    }
}

impl TaskDebugger {
    fn with<F, R>(f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        DEBUGGER.with(|dbg| {
            let mut dbg = dbg.borrow_mut();
            let dbg = dbg.get_or_insert_with(|| TaskDebugger {
                registry: HashMap::new(),
                #[cfg(not(feature = "debugging"))]
                filter: has_label,
                #[cfg(feature = "debugging")]
                filter: any_task,
                task_count: 0,
                current_task: None,
                context: Vec::new(),
            });
            f(dbg)
        })
    }

    /// Replace the filter deciding which newly registered tasks are traced.
    pub fn set_filter(filter: fn(Option<&'static str>) -> bool) {
        Self::with(|dbg| {
            dbg.filter = filter;
        });
    }

    /// Log every traced task that has been alive for longer than `older_than`.
    pub fn debug_aged_tasks(older_than: std::time::Duration) {
        Self::with(|dbg| {
            let mut count = 0;
            for v in dbg.registry.values() {
                let age = v.ts.elapsed();
                if age > older_than {
                    count += 1;
                    dbg.debug_task_info(v, format!("age: {:?}", age).as_str())
                }
            }
            if count > 0 {
                log::debug!("found {} tasks older than {:?}", count, older_than)
            }
        })
    }

    /// Number of live tasks on this thread, traced or not, summed over every executor.
    pub fn task_count() -> usize {
        Self::with(|dbg| dbg.task_count)
    }

    /// The task currently being resumed on this thread, if any.
    pub fn current_task() -> Option<TaskId> {
        Self::with(|dbg| dbg.current_task)
    }

    pub(crate) fn register(executor: usize, id: TaskId, label: Option<&'static str>) -> bool {
        Self::with(|dbg| {
            dbg.task_count += 1;
            if (dbg.filter)(label) {
                dbg.registry
                    .insert((executor, id), TaskInfo::new(executor, id, label));
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn unregister(executor: usize, id: TaskId) {
        Self::with(|dbg| {
            dbg.task_count = dbg.task_count.saturating_sub(1);
            dbg.registry.remove(&(executor, id));
        });
    }

    /// Swap the current task, returning the previous one so nested resumes can restore it.
    pub(crate) fn set_current_task(id: Option<TaskId>) -> Option<TaskId> {
        Self::with(|dbg| std::mem::replace(&mut dbg.current_task, id))
    }

    pub(crate) fn enter(executor: usize, id: TaskId, ctx: &'static str) -> bool {
        Self::with(|dbg| {
            if let Some(info) = dbg.registry.get(&(executor, id)) {
                dbg.context.push(ctx);
                dbg.debug_task_info(info, "");
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn leave() {
        Self::with(|dbg| {
            dbg.context.pop();
        });
    }

    fn debug_task_info(&self, info: &TaskInfo, msg: &str) {
        log::debug!(
            "[ex:{}][{:?}][label:{}][{}]{}",
            info.executor,
            info.id,
            info.label.unwrap_or(""),
            self.context.join("|"),
            msg
        )
    }
}

#[cfg(all(test, not(feature = "debugging")))]
mod test {
    use slotmap::SlotMap;

    use super::TaskDebugger;
    use crate::task::TaskId;

    #[test]
    fn only_labelled_tasks_are_traced() {
        let mut ids = SlotMap::<TaskId, ()>::with_key();
        let labelled = ids.insert(());
        let anonymous = ids.insert(());

        assert!(TaskDebugger::register(1, labelled, Some("traced")));
        assert!(!TaskDebugger::register(1, anonymous, None));
        assert_eq!(TaskDebugger::task_count(), 2);

        assert!(TaskDebugger::enter(1, labelled, "resume"));
        TaskDebugger::leave();
        assert!(!TaskDebugger::enter(1, anonymous, "resume"));

        TaskDebugger::unregister(1, labelled);
        TaskDebugger::unregister(1, anonymous);
        assert_eq!(TaskDebugger::task_count(), 0);
    }

    #[test]
    fn current_task_nests() {
        let mut ids = SlotMap::<TaskId, ()>::with_key();
        let outer = ids.insert(());
        let inner = ids.insert(());

        assert_eq!(TaskDebugger::set_current_task(Some(outer)), None);
        let prev = TaskDebugger::set_current_task(Some(inner));
        assert_eq!(TaskDebugger::current_task(), Some(inner));

        TaskDebugger::set_current_task(prev);
        assert_eq!(TaskDebugger::current_task(), Some(outer));
        TaskDebugger::set_current_task(None);
    }

    #[test]
    fn custom_filter_applies_to_new_tasks() {
        let mut ids = SlotMap::<TaskId, ()>::with_key();
        let id = ids.insert(());

        TaskDebugger::set_filter(|label| label == Some("wanted"));
        assert!(!TaskDebugger::register(1, id, Some("other")));
        TaskDebugger::unregister(1, id);
        assert!(TaskDebugger::register(1, id, Some("wanted")));
        TaskDebugger::unregister(1, id);
    }

    #[test]
    fn executors_sharing_a_thread_keep_separate_entries() {
        // two task tables hand out the same first key
        let first = SlotMap::<TaskId, ()>::with_key().insert(());
        let second = SlotMap::<TaskId, ()>::with_key().insert(());
        assert_eq!(first, second);

        assert!(TaskDebugger::register(1, first, Some("a")));
        assert!(TaskDebugger::register(2, second, Some("b")));

        TaskDebugger::unregister(1, first);
        assert!(!TaskDebugger::enter(1, first, "resume"));
        assert!(TaskDebugger::enter(2, second, "resume"));
        TaskDebugger::leave();

        TaskDebugger::unregister(2, second);
        assert_eq!(TaskDebugger::task_count(), 0);
    }
}
