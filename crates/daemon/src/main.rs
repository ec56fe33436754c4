use std::sync::Arc;

use clap::Parser;

use sourcemerge_core::coalescer::MergeScanCoalescer;
use sourcemerge_core::logger::{LogLevel, Logger};
use sourcemerge_core::mount_command::MountCommandService;
use sourcemerge_core::mount_snapshot::MountSnapshotService;
use sourcemerge_core::pipeline::TriggerPipeline;
use sourcemerge_core::rename_processor::RenameQueueProcessor;
use sourcemerge_core::rename_queue::RenameQueueStore;

use sourcemerge_daemon::cli::Args;
use sourcemerge_daemon::config::Settings;
use sourcemerge_daemon::executor::ProcessCommandExecutor;
use sourcemerge_daemon::fsadapter::StdFilesystemAdapter;
use sourcemerge_daemon::fsnotify::NotifyInotifyReader;
use sourcemerge_daemon::logging::{init_tracing, TracingLogger};
use sourcemerge_daemon::supervisor::{self, MergeWorkflowHandler};
use sourcemerge_daemon::{equivalence, priority};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = Settings::load(&args.config_root)?;
    let log_filter = args
        .log_filter
        .clone()
        .unwrap_or_else(|| settings.diagnostics.log_filter.clone());
    init_tracing(&log_filter);

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
    logger.log(
        LogLevel::Normal,
        "startup.config_loaded",
        &format!("loaded config from {}", args.config_root.display()),
        &[],
    );

    let fs_adapter = Arc::new(StdFilesystemAdapter);
    let executor = Arc::new(ProcessCommandExecutor);
    let reader = NotifyInotifyReader::new();

    let equivalence_catalog = Arc::new(equivalence::build_catalog(&settings));
    let priority_service = Arc::new(priority::build_priority_service(&settings));

    let rename_store = Arc::new(RenameQueueStore::new());
    let rename_processor = Arc::new(RenameQueueProcessor::new(
        settings.to_chapter_rename_options(),
        rename_store,
        fs_adapter.clone(),
        logger.clone(),
    ));

    let coalescer = Arc::new(MergeScanCoalescer::new(
        settings.coalescer_min_interval(),
        settings.coalescer_retry_delay(),
    ));

    let mount_snapshot = Arc::new(MountSnapshotService::new(
        settings.to_mount_snapshot_options(),
        executor.clone(),
    ));
    let mount_command = Arc::new(MountCommandService::new(
        settings.to_mount_command_options(),
        executor.clone(),
        mount_snapshot.clone(),
    ));

    let merge_workflow = Arc::new(sourcemerge_core::merge_workflow::MergeWorkflow::new(
        settings.to_merge_workflow_options(),
        fs_adapter.clone(),
        equivalence_catalog,
        priority_service,
        mount_snapshot,
        mount_command,
        logger.clone(),
    ));
    let handler = MergeWorkflowHandler::new(merge_workflow);

    let pipeline = TriggerPipeline::new(
        settings.to_trigger_pipeline_options(),
        rename_processor,
        coalescer,
        logger.clone(),
    );

    let supervisor_options = settings.to_supervisor_options(&args.config_root);

    supervisor::run(supervisor_options, pipeline, reader, handler, logger.clone())
        .await
        .map_err(anyhow::Error::from)
}
