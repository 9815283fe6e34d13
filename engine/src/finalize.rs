//! C9: the finalizer. Groups developed submodules back under their modules,
//! assigns `run_id`, and produces the terminal [`RunResult`].

use learnpath_core::{
    capability::Clock,
    model::{DevelopedSubmodule, EnhancedModule},
    progress::ProgressEvent,
    result::{ResultModule, ResultSubmodule},
    RunResult,
};
use uuid::Uuid;

use crate::progress::ProgressEmitter;

/// Builds the final [`RunResult`]: groups `developed` by `module_index`,
/// sorts each group by `submodule_index`, and stitches planner metadata back
/// on. `run_id` is generated here, once, and is never the value the emitter
/// keyed progress snapshots or error correlation with during the run.
pub async fn run(
    topic: &str,
    language: &str,
    enhanced_modules: &[EnhancedModule],
    mut developed: Vec<DevelopedSubmodule>,
    execution_steps: Vec<String>,
    clock: &dyn Clock,
    emitter: &ProgressEmitter,
) -> RunResult {
    let run_id = Uuid::new_v4();
    tracing::info!(run_id = %run_id, module_count = enhanced_modules.len(), submodule_count = developed.len(), "finalizing run");
    developed.sort_by_key(|d| (d.module_index, d.submodule_index));

    let modules = enhanced_modules
        .iter()
        .enumerate()
        .map(|(module_index, enhanced)| {
            let submodules = developed
                .iter()
                .filter(|d| d.module_index == module_index)
                .map(|d| ResultSubmodule {
                    order: d.submodule_index as u32 + 1,
                    title: d.title.clone(),
                    description: d.description.clone(),
                    depth_level: enhanced.submodules.get(d.submodule_index).map(|s| s.depth_level).unwrap_or_default(),
                    content: d.content.clone(),
                    summary: d.summary.clone(),
                    word_count: d.word_count,
                    resource_count: d.resource_count,
                })
                .collect();
            ResultModule { module: enhanced.module.clone(), submodules }
        })
        .collect();

    let now = clock.now();
    emitter.emit(ProgressEvent::completed(now)).await;

    RunResult {
        run_id,
        topic: topic.to_string(),
        language: language.to_string(),
        modules,
        execution_steps,
        generated_at: now,
    }
}
