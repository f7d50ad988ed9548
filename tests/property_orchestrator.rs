// tests/property_orchestrator.rs

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use willowcal::orchestrator::{Orchestrator, OrchestratorOptions};
use willowcal::types::RepoStatus;
use willowcal_test_utils::builders::JobBuilder;
use willowcal_test_utils::fakes::{ConcurrencyProbe, FakeCloner, FakeCommandExecutor};

/// Per job: clone failures before success (4 = always) and an optional
/// failing setup command with its failure count.
fn job_plan_strategy() -> impl Strategy<Value = Vec<(u8, Option<u8>)>> {
    proptest::collection::vec((0u8..=4, proptest::option::of(0u8..=4)), 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn execution_invariants_hold(plan in job_plan_strategy(), parallel in 1usize..=6) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        let probe = ConcurrencyProbe::new();
        let mut cloner = FakeCloner::new()
            .with_delay(Duration::from_millis(2))
            .with_probe(probe.clone());
        let mut executor = FakeCommandExecutor::new();
        let mut jobs = Vec::new();

        for (i, (clone_failures, setup_failures)) in plan.iter().enumerate() {
            let mut builder = JobBuilder::new(&format!("repo_{i}")).setup(&format!("prepare_{i}"));
            let url = format!("https://example.com/repo_{i}.git");
            cloner = match clone_failures {
                0 => cloner,
                4 => cloner.fail_always(&url),
                n => cloner.fail_times(&url, *n as usize),
            };
            if let Some(n) = setup_failures {
                let cmd = format!("build_{i}");
                builder = builder.setup(&cmd);
                executor = match n {
                    4 => executor.fail_always(&cmd),
                    n => executor.fail_times(&cmd, *n as usize),
                };
            }
            jobs.push(builder.build());
        }

        let cloner = Arc::new(cloner);
        let executor = Arc::new(executor);
        let orch = Orchestrator::new(
            cloner.clone(),
            executor.clone(),
            "/workspace",
            OrchestratorOptions { max_parallel_jobs: parallel, max_retries: 3 },
        );

        let state = rt.block_on(orch.execute(jobs.clone()));

        let names: BTreeSet<_> = jobs.iter().map(|j| j.name.clone()).collect();
        prop_assert_eq!(state.success_count + state.failure_count, names.len());
        prop_assert!(probe.peak() <= parallel.min(jobs.len()));

        for job in &jobs {
            let repo = &state.repo_states[&job.name];
            prop_assert!(repo.current_retry <= 3);
            prop_assert!(repo.status.is_terminal());

            // Each job runs at most four times, and stops cloning once a clone
            // has succeeded.
            let clones = cloner.call_count(&job.source_url);
            prop_assert!(clones <= 4);
            if repo.clone_succeeded() {
                let failed_clones = clones - 1;
                prop_assert!(failed_clones as u32 <= repo.current_retry);
            }

            // Setup runs in declared order within each attempt.
            let cmds: Vec<_> = executor
                .commands()
                .into_iter()
                .filter(|c| c.ends_with(&format!("_{}", &job.name["repo_".len()..])))
                .collect();
            for pair in cmds.windows(2) {
                if pair[1].starts_with("build_") {
                    prop_assert!(pair[0].starts_with("prepare_"));
                }
            }

            if repo.status == RepoStatus::Success {
                prop_assert!(repo.error.is_none());
            }
        }
    }
}
