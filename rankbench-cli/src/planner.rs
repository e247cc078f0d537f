//! Task Planner
//!
//! Builds the execution plan by filtering and ordering registered tasks.
//!
//! Filtering options:
//! - Regex pattern matching on task ID
//! - Group filtering
//! - Tag inclusion/exclusion
//!
//! Ordering: tasks are sorted alphabetically by ID so every rank walks the
//! plan in the same order.

use rankbench_core::TaskDef;

/// Execution plan for tasks
pub struct ExecutionPlan {
    /// Ordered list of tasks to run
    pub tasks: Vec<&'static TaskDef>,
}

impl ExecutionPlan {
    /// Number of planned tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing matched the filters
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Build execution plan from discovered tasks
pub fn build_plan(
    tasks: impl IntoIterator<Item = &'static TaskDef>,
    filter: Option<&regex::Regex>,
    group: Option<&str>,
    tag: Option<&str>,
    skip_tag: Option<&str>,
) -> ExecutionPlan {
    let mut selected: Vec<_> = tasks
        .into_iter()
        .filter(|t| filter.is_none_or(|re| re.is_match(t.id)))
        .filter(|t| group.is_none_or(|g| t.group == g))
        .filter(|t| tag.is_none_or(|tag| t.has_tag(tag)))
        .filter(|t| skip_tag.is_none_or(|tag| !t.has_tag(tag)))
        .collect();

    selected.sort_by_key(|t| t.id);
    selected.dedup_by_key(|t| t.id);

    ExecutionPlan { tasks: selected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankbench_comm::Communicator;
    use rankbench_core::{SharedTaskData, Task, TaskData};

    struct Noop;

    impl Task for Noop {
        fn validate(&mut self) -> bool {
            true
        }
        fn preprocess(&mut self) -> bool {
            true
        }
        fn compute(&mut self) -> bool {
            true
        }
        fn postprocess(&mut self) -> bool {
            true
        }
    }

    fn make_task(
        id: &'static str,
        group: &'static str,
        tags: &'static [&'static str],
    ) -> &'static TaskDef {
        Box::leak(Box::new(TaskDef {
            id,
            group,
            variant: "seq",
            tags,
            data: |_: &Communicator| SharedTaskData::from(TaskData::new()),
            build: |_, _| Box::new(Noop),
            verify: None,
        }))
    }

    #[test]
    fn test_no_filter() {
        let tasks = [
            make_task("c_task", "default", &[]),
            make_task("a_task", "default", &[]),
            make_task("b_task", "default", &[]),
        ];

        let plan = build_plan(tasks, None, None, None, None);

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.tasks[0].id, "a_task");
        assert_eq!(plan.tasks[1].id, "b_task");
        assert_eq!(plan.tasks[2].id, "c_task");
    }

    #[test]
    fn test_regex_filter() {
        let tasks = [
            make_task("sum_seq", "sum", &[]),
            make_task("sum_par", "sum", &[]),
            make_task("min_par", "min", &[]),
        ];
        let re = regex::Regex::new("_par$").unwrap();

        let plan = build_plan(tasks, Some(&re), None, None, None);

        let ids: Vec<_> = plan.tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, ["min_par", "sum_par"]);
    }

    #[test]
    fn test_group_filter() {
        let tasks = [
            make_task("task1", "group_a", &[]),
            make_task("task2", "group_b", &[]),
            make_task("task3", "group_a", &[]),
        ];

        let plan = build_plan(tasks, None, Some("group_a"), None, None);

        assert_eq!(plan.len(), 2);
        assert!(plan.tasks.iter().all(|t| t.group == "group_a"));
    }

    #[test]
    fn test_tag_filters() {
        let tasks = [
            make_task("task1", "default", &["fast"]),
            make_task("task2", "default", &["slow"]),
            make_task("task3", "default", &["fast", "skip_ci"]),
        ];

        let plan = build_plan(tasks, None, None, Some("fast"), None);
        assert_eq!(plan.len(), 2);

        let plan = build_plan(tasks, None, None, Some("fast"), Some("skip_ci"));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.tasks[0].id, "task1");
    }

    #[test]
    fn test_empty_plan() {
        let tasks = [make_task("only", "default", &[])];
        let plan = build_plan(tasks, None, Some("missing"), None, None);
        assert!(plan.is_empty());
    }
}
