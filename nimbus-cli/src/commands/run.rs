//! `run` command
//!
//! Builds the immutable `RunRequest` from the collected flags, hosts the
//! webhook listener while a webhook wait is active, maps Ctrl-C to the
//! engine's interrupt signal, and turns the report into an exit code.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use tokio::sync::Notify;
use tracing::info;

use nimbus_client::CloudClient;
use nimbus_core::domain::project::NotificationEmailKind;
use nimbus_core::domain::request::{
    DetectionStrategy, RunRequest, TestCaseSelection, TestCaseSelector, WaitPolicy,
};
use nimbus_core::domain::run::SchedulerMode;
use nimbus_engine::config::EngineConfig;
use nimbus_engine::hook;
use nimbus_engine::runner::CloudRunner;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Remote project id
    #[arg(long)]
    pub project_id: u64,

    /// Device group to run against
    #[arg(long)]
    pub device_group_id: u64,

    /// Application binary to upload (.apk, .ipa)
    #[arg(long)]
    pub app: String,

    /// Instrumentation test package; omit for app-crawler mode
    #[arg(long)]
    pub test: Option<String>,

    /// Extra data file uploaded alongside the app
    #[arg(long)]
    pub data: Option<String>,

    /// Display name for the run; unresolved $VARS submit as unnamed
    #[arg(long)]
    pub test_run_name: Option<String>,

    /// parallel, serial or single
    #[arg(long, default_value = "parallel")]
    pub scheduler: SchedulerMode,

    /// Device language code
    #[arg(long, default_value = "en-US")]
    pub language: String,

    /// Instrumentation runner class
    #[arg(long)]
    pub test_runner: Option<String>,

    /// Only run tests carrying this annotation
    #[arg(long)]
    pub with_annotation: Option<String>,

    /// Skip tests carrying this annotation
    #[arg(long)]
    pub without_annotation: Option<String>,

    /// package or class
    #[arg(long)]
    pub test_cases_select: Option<TestCaseSelector>,

    /// Value for --test-cases-select
    #[arg(long)]
    pub test_cases_value: Option<String>,

    /// Comma separated k=v pairs forwarded to the run
    #[arg(long)]
    pub key_value_pairs: Option<String>,

    /// On-device directory screenshots are collected from
    #[arg(long)]
    pub screenshots_directory: Option<String>,

    /// Address for run outcome mails
    #[arg(long)]
    pub notification_email: Option<String>,

    /// always or on-failure
    #[arg(long, default_value = "always")]
    pub notification_email_type: NotificationEmailKind,

    /// Per-run timeout in seconds; only honored for paid accounts
    #[arg(long)]
    pub test_timeout: Option<String>,

    /// Fail the build when the run fails
    #[arg(long)]
    pub fail_build: bool,

    /// Wait for the run to finish before exiting
    #[arg(long)]
    pub wait: bool,

    /// poll or webhook
    #[arg(long, default_value = "webhook")]
    pub wait_method: DetectionStrategy,

    /// Callback URL override for webhook waits
    #[arg(long)]
    pub hook_url: Option<String>,

    /// Total wait timeout in seconds; required with --wait
    #[arg(long)]
    pub wait_timeout: Option<u64>,

    /// Where to store downloaded results (defaults to the working directory)
    #[arg(long)]
    pub results_path: Option<String>,

    /// Also download screenshot archives
    #[arg(long)]
    pub download_screenshots: bool,

    /// Abort the remote run if the wait times out or is interrupted
    #[arg(long)]
    pub force_abort: bool,

    /// Publicly reachable base URL for the self-hosted callback endpoint
    #[arg(long, env = "NIMBUS_PUBLIC_URL", default_value = "http://localhost:8089")]
    pub public_url: String,

    /// Bind address for the callback listener
    #[arg(long, env = "NIMBUS_HOOK_BIND", default_value = "0.0.0.0:8089")]
    pub hook_bind: String,

    /// Append CLOUD_LINK=<url> to this file for downstream steps
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}

/// Turn the flat flag set into the engine's request model. The wait
/// policy exists only when --wait was given.
fn build_request(args: &RunArgs) -> Result<RunRequest> {
    let mut request = RunRequest::new(args.project_id, args.device_group_id, args.app.clone());
    request.test_path = args.test.clone();
    request.data_path = args.data.clone();
    request.test_run_name = args.test_run_name.clone();
    request.instrumentation_runner = args.test_runner.clone();
    request.with_annotation = args.with_annotation.clone();
    request.without_annotation = args.without_annotation.clone();
    request.key_value_pairs = args.key_value_pairs.clone();
    request.screenshots_directory = args.screenshots_directory.clone();
    request.notification_email = args.notification_email.clone();
    request.notification_email_kind = args.notification_email_type;
    request.scheduler = args.scheduler;
    request.language = args.language.clone();
    request.test_timeout = args.test_timeout.clone();
    request.fail_fast = args.fail_build;

    request.test_cases = match (args.test_cases_select, &args.test_cases_value) {
        (Some(selector), Some(value)) => Some(TestCaseSelection {
            selector,
            value: value.clone(),
        }),
        (Some(_), None) => {
            anyhow::bail!("--test-cases-value is required with --test-cases-select")
        }
        _ => None,
    };

    if args.wait {
        let timeout = args
            .wait_timeout
            .context("--wait-timeout is required with --wait")?;
        let mut policy = WaitPolicy::new(Duration::from_secs(timeout));
        policy.strategy = args.wait_method;
        policy.hook_url = args.hook_url.clone();
        policy.results_path = args.results_path.clone();
        policy.download_screenshots = args.download_screenshots;
        policy.force_abort_on_break = args.force_abort;
        request.wait = Some(policy);
    }

    request.validate()?;
    Ok(request)
}

pub async fn handle_run(args: RunArgs, config: &Config) -> Result<()> {
    let request = build_request(&args)?;

    let mut engine_config = EngineConfig::new(&config.cloud_url, &config.api_token);
    engine_config.public_url = args.public_url.clone();
    engine_config.hook_bind_addr = args.hook_bind.clone();
    engine_config.validate()?;

    let cloud = Arc::new(CloudClient::new(&config.cloud_url, &config.api_token));
    let runner = CloudRunner::new(cloud, engine_config.clone());

    // Serve the callback endpoint while a webhook wait is active.
    let mut hook_task = None;
    if request
        .wait
        .as_ref()
        .is_some_and(|policy| policy.strategy == DetectionStrategy::WebhookCallback)
    {
        let listener = tokio::net::TcpListener::bind(&engine_config.hook_bind_addr)
            .await
            .with_context(|| {
                format!(
                    "failed to bind callback listener on {}",
                    engine_config.hook_bind_addr
                )
            })?;
        info!("callback listener on {}", engine_config.hook_bind_addr);
        hook_task = Some(tokio::spawn(hook::serve(listener, runner.watch_registry())));
    }

    // Ctrl-C breaks the wait instead of killing the process outright.
    let interrupt = Arc::new(Notify::new());
    let interrupt_signal = Arc::clone(&interrupt);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt_signal.notify_one();
        }
    });

    let workdir = std::env::current_dir().context("cannot resolve working directory")?;
    let vars: HashMap<String, String> = std::env::vars().collect();

    let report = runner.execute(&request, &workdir, &vars, interrupt).await;

    if let Some(task) = hook_task {
        task.abort();
    }

    if let Some(link) = &report.deep_link {
        println!("CLOUD_LINK={link}");
        if let Some(path) = &args.env_file {
            append_env_file(path, link)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }

    if report.success {
        println!("{}", "Cloud test run succeeded.".green());
        Ok(())
    } else if args.fail_build {
        anyhow::bail!("cloud test run failed")
    } else {
        println!("{}", "Cloud test run failed (not failing the build).".yellow());
        Ok(())
    }
}

fn append_env_file(path: &PathBuf, link: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "CLOUD_LINK={link}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    fn parse(extra: &[&str]) -> RunArgs {
        let mut argv = vec![
            "nimbus",
            "--project-id",
            "144314736",
            "--device-group-id",
            "36085",
            "--app",
            "app.apk",
        ];
        argv.extend_from_slice(extra);
        TestCli::parse_from(argv).args
    }

    #[test]
    fn minimal_flags_build_a_fire_and_forget_request() {
        let request = build_request(&parse(&[])).unwrap();
        assert_eq!(request.project_id, 144314736);
        assert_eq!(request.device_group_id, 36085);
        assert_eq!(request.scheduler, SchedulerMode::Parallel);
        assert!(request.wait.is_none());
        assert!(!request.is_full_test());
    }

    #[test]
    fn wait_needs_a_timeout() {
        let err = build_request(&parse(&["--wait"])).unwrap_err();
        assert!(err.to_string().contains("--wait-timeout"));
    }

    #[test]
    fn wait_flags_build_a_policy() {
        let request = build_request(&parse(&[
            "--wait",
            "--wait-timeout",
            "300",
            "--wait-method",
            "poll",
            "--force-abort",
        ]))
        .unwrap();
        let policy = request.wait.unwrap();
        assert_eq!(policy.strategy, DetectionStrategy::ActivePoll);
        assert_eq!(policy.timeout, Duration::from_secs(300));
        assert!(policy.force_abort_on_break);
        assert!(!policy.download_screenshots);
    }

    #[test]
    fn zero_wait_timeout_is_rejected() {
        let err = build_request(&parse(&["--wait", "--wait-timeout", "0"])).unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_case_selection_needs_both_flags() {
        let err =
            build_request(&parse(&["--test-cases-select", "package"])).unwrap_err();
        assert!(err.to_string().contains("--test-cases-value"));

        let request = build_request(&parse(&[
            "--test-cases-select",
            "class",
            "--test-cases-value",
            "com.example.SmokeTest",
        ]))
        .unwrap();
        let selection = request.test_cases.unwrap();
        assert_eq!(selection.selector, TestCaseSelector::Class);
        assert_eq!(selection.value, "com.example.SmokeTest");
    }
}
