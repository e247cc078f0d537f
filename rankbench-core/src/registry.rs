//! Task Registry
//!
//! Plug-ins register themselves with `register_task!`; the CLI discovers them
//! through `inventory` at start-up.

use crate::data::{SharedTaskData, TestingMode};
use crate::task::Task;
use rankbench_comm::Communicator;

/// A registered task variant
#[derive(Debug, Clone, Copy)]
pub struct TaskDef {
    /// Unique identifier
    pub id: &'static str,
    /// Exercise the variant belongs to (e.g. `vector_sum`)
    pub group: &'static str,
    /// Variant name (e.g. `seq`, `par`)
    pub variant: &'static str,
    /// Tags for filtering
    pub tags: &'static [&'static str],
    /// Descriptor for one run on this rank; populated on rank 0 by convention
    pub data: fn(&Communicator) -> SharedTaskData,
    /// Construct the task bound to its descriptor and group
    pub build: fn(SharedTaskData, &Communicator) -> Box<dyn Task>,
    /// Check rank 0's outputs after a functional run
    pub verify: Option<fn(&SharedTaskData) -> bool>,
}

impl TaskDef {
    /// Descriptor tagged with `mode` and a task instance bound to it
    pub fn instantiate(
        &self,
        comm: &Communicator,
        mode: TestingMode,
    ) -> (SharedTaskData, Box<dyn Task>) {
        let data = (self.data)(comm);
        data.write().state_of_testing = mode;
        let task = (self.build)(data.clone(), comm);
        (data, task)
    }

    /// Whether the task carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag)
    }
}

inventory::collect!(TaskDef);

/// Every registered task, sorted by id
pub fn registered_tasks() -> Vec<&'static TaskDef> {
    let mut tasks: Vec<&'static TaskDef> = inventory::iter::<TaskDef>.into_iter().collect();
    tasks.sort_by_key(|task| task.id);
    tasks
}

/// Registered task with `id`
pub fn find_task(id: &str) -> Option<&'static TaskDef> {
    inventory::iter::<TaskDef>.into_iter().find(|task| task.id == id)
}

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<TaskDef> {}
};

/// Register a task variant with the CLI.
///
/// ```ignore
/// register_task! {
///     id: "vector_sum_seq_i32",
///     group: "vector_sum",
///     variant: "seq",
///     tags: ["sum", "i32"],
///     data: sum_input::<i32>,
///     build: build_sum_seq::<i32>,
///     verify: check_sum::<i32>,
/// }
/// ```
#[macro_export]
macro_rules! register_task {
    (
        id: $id:expr,
        group: $group:expr,
        variant: $variant:expr,
        $(tags: [$($tag:expr),* $(,)?],)?
        data: $data:expr,
        build: $build:expr
        $(, verify: $verify:expr)?
        $(,)?
    ) => {
        $crate::inventory::submit! {
            $crate::TaskDef {
                id: $id,
                group: $group,
                variant: $variant,
                tags: &[$($($tag),*)?],
                data: $data,
                build: $build,
                verify: $crate::__task_verify!($($verify)?),
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __task_verify {
    () => {
        ::core::option::Option::None
    };
    ($verify:expr) => {
        ::core::option::Option::Some($verify)
    };
}
