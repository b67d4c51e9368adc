use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};

use learnings_aws::{BuildError, CloudFormationProvider, StackConfig, build_stack};
use learnings_core::differ::{DELETION_POLICY, DEPENDS_ON, create_stack_plan};
use learnings_core::effect::Effect;
use learnings_core::interpreter::{ApplyOutcome, Interpreter, InterpreterConfig};
use learnings_core::plan::{Plan, StackChange};
use learnings_core::provider::Provider;
use learnings_core::resource::{RemovalPolicy, Value};
use learnings_core::stack::Stack;
use learnings_core::template;

const DEFAULT_CONFIG: &str = "learnings.toml";
const LOG_ENV: &str = "LEARNINGS_LOG";

#[derive(Parser)]
#[command(name = "learnings")]
#[command(about = "Declare, synthesize and deploy the learnings stack", long_about = None)]
struct Cli {
    /// Path to the stack configuration (defaults are used when learnings.toml is absent)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Build the pipeline variant from the [pipeline] table
    #[arg(long, global = true)]
    pipeline: bool,

    /// Override the stack name
    #[arg(long, global = true)]
    stack_name: Option<String>,

    /// Override the region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the CloudFormation template
    Synth {
        /// Output directory
        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,

        /// Print the template instead of writing it
        #[arg(long)]
        stdout: bool,
    },
    /// Build the stack and validate it against the resource schemas
    Validate,
    /// Show the dependency tree of the stack
    Graph,
    /// Show what deploying would change
    Diff {
        /// Compare with a template file instead of the deployed stack
        #[arg(long)]
        against: Option<PathBuf>,
    },
    /// Create or update the stack
    Deploy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Delete the stack
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn init_logging(verbose: u8) {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, log_level(verbose)))
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Synth { out, stdout } => run_synth(&config, &out, stdout),
        Commands::Validate => run_validate(&config),
        Commands::Graph => run_graph(&config),
        Commands::Diff { against } => run_diff(&config, against.as_deref()).await,
        Commands::Deploy { auto_approve } => run_deploy(&config, auto_approve).await,
        Commands::Destroy { auto_approve } => run_destroy(&config, auto_approve).await,
    }
}

fn load_config(cli: &Cli) -> Result<StackConfig> {
    let mut config = match &cli.config {
        Some(path) => StackConfig::load(path)?,
        None => StackConfig::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };
    if cli.pipeline {
        config = config.into_pipeline_variant()?;
    }
    if let Some(name) = &cli.stack_name {
        config.stack_name = name.clone();
    }
    if let Some(region) = &cli.region {
        config.region = Some(region.clone());
    }
    Ok(config)
}

fn build(config: &StackConfig) -> Result<Stack> {
    build_stack(config).map_err(|e| match e {
        BuildError::Invalid(errors) => anyhow::anyhow!(
            "stack failed validation:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        ),
        other => other.into(),
    })
}

fn template_path(out: &Path, stack_name: &str) -> PathBuf {
    out.join(format!("{}.template.json", stack_name))
}

fn run_synth(config: &StackConfig, out: &Path, stdout: bool) -> Result<()> {
    let stack = build(config)?;
    let rendered = template::render(&stack).context("Failed to render template")?;

    if stdout {
        println!("{}", rendered);
        return Ok(());
    }

    fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
    let path = template_path(out, &stack.name);
    fs::write(&path, rendered + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!(
        "{} {} ({} resources)",
        "Synthesized".green().bold(),
        path.display(),
        stack.resources().len()
    );
    Ok(())
}

fn run_validate(config: &StackConfig) -> Result<()> {
    let stack = build(config)?;
    let variant = if config.has_pipeline() {
        "with pipeline"
    } else {
        "container only"
    };
    println!(
        "{} {} ({}): {} resources, {} outputs",
        "✓".green().bold(),
        stack.name.bold(),
        variant,
        stack.resources().len(),
        stack.outputs().len()
    );
    Ok(())
}

fn run_graph(config: &StackConfig) -> Result<()> {
    let stack = build(config)?;
    let graph = stack.dependency_graph();
    let Some(order) = graph.topological_order() else {
        bail!("dependency cycle in stack {}", stack.name);
    };

    println!("{}", "Dependency order:".cyan().bold());
    println!();
    for logical_id in &order {
        let resource_type = stack
            .find(logical_id)
            .map(|r| r.id.resource_type.as_str())
            .unwrap_or("?");
        println!("  {} {}", logical_id.bold(), resource_type.dimmed());

        let deps = graph.dependencies_of(logical_id);
        for (i, dep) in deps.iter().enumerate() {
            let connector = if i + 1 == deps.len() { "└─" } else { "├─" };
            let marker = if dep.explicit { " (DependsOn)" } else { "" };
            println!("    {} {}{}", connector, dep.target, marker.dimmed());
        }
    }
    println!();
    println!(
        "{} resources, {} without dependencies",
        order.len(),
        graph.root_resources().len()
    );
    Ok(())
}

async fn provider_for(config: &StackConfig) -> CloudFormationProvider {
    CloudFormationProvider::new(config.region.as_deref()).await
}

/// Previously deployed template of the stack, if any
async fn deployed_template<P: Provider>(
    provider: &P,
    stack_name: &str,
) -> Result<Option<serde_json::Value>> {
    let deployed = provider
        .read(stack_name)
        .await
        .context("Failed to read deployed stack")?;
    Ok(deployed.and_then(|stack| stack.template))
}

fn plan_against(stack: &Stack, previous: Option<&serde_json::Value>) -> Result<Plan> {
    create_stack_plan(stack, previous).context("Failed to read previous template")
}

async fn run_diff(config: &StackConfig, against: Option<&Path>) -> Result<()> {
    let stack = build(config)?;

    let previous = match against {
        Some(path) => {
            let body = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Some(
                serde_json::from_str(&body)
                    .with_context(|| format!("{} is not a JSON template", path.display()))?,
            )
        }
        None => deployed_template(&provider_for(config).await, &stack.name).await?,
    };

    let plan = plan_against(&stack, previous.as_ref())?;
    print_plan(&plan);

    if !plan.is_empty() {
        println!();
        print_template_diff(previous.as_ref(), &template::synthesize(&stack))?;
    }
    Ok(())
}

async fn run_deploy(config: &StackConfig, auto_approve: bool) -> Result<()> {
    let stack = build(config)?;
    let provider = provider_for(config).await;

    let previous = deployed_template(&provider, &stack.name).await?;
    let plan = plan_against(&stack, previous.as_ref())?;
    print_plan(&plan);

    if plan.is_empty() {
        return Ok(());
    }
    println!();

    if !auto_approve {
        let (question, warning) = deploy_prompt(&plan);
        if !confirm(question, warning)? {
            println!("{}", "Deploy cancelled.".yellow());
            return Ok(());
        }
    }

    println!("{}", format!("Deploying {}...", stack.name).cyan().bold());
    let interpreter = Interpreter::new(provider).with_config(InterpreterConfig {
        dry_run: false,
        allow_destructive: true,
    });

    match interpreter.apply(&stack, &plan).await? {
        ApplyOutcome::Deployed { stack: deployed } => {
            println!();
            println!(
                "{}",
                format!("Deploy complete! {} is {}.", deployed.name, deployed.status)
                    .green()
                    .bold()
            );
            if !deployed.outputs.is_empty() {
                println!();
                println!("{}", "Outputs:".bold());
                let mut outputs: Vec<_> = deployed.outputs.iter().collect();
                outputs.sort();
                for (key, value) in outputs {
                    println!("  {} = {}", key.cyan(), value);
                }
            }
        }
        ApplyOutcome::NoChanges => {
            println!("{}", "No changes. Infrastructure is up-to-date.".green())
        }
        ApplyOutcome::Skipped { reason } => println!("{} {}", "Skipped:".yellow(), reason),
        ApplyOutcome::Destroyed => {}
    }
    Ok(())
}

fn deploy_prompt(plan: &Plan) -> (&'static str, &'static str) {
    if plan.has_destructive_changes() {
        (
            "This plan replaces or deletes resources. Do you want to deploy?",
            "Replaced or deleted resources cannot be recovered. Type 'yes' to confirm.",
        )
    } else {
        (
            "Do you want to deploy these changes?",
            "Only 'yes' will be accepted to approve.",
        )
    }
}

/// Declared resources that outlive the stack, as (type, logical id)
///
/// An invalid configuration yields none; destroying only needs the stack name.
fn retained_resources(config: &StackConfig) -> Vec<(String, String)> {
    match build_stack(config) {
        Ok(stack) => stack
            .resources()
            .iter()
            .filter(|r| r.removal_policy == Some(RemovalPolicy::Retain))
            .map(|r| (r.id.resource_type.clone(), r.logical_id().to_string()))
            .collect(),
        Err(e) => {
            log::warn!("cannot list retained resources: {}", e);
            Vec::new()
        }
    }
}

async fn run_destroy(config: &StackConfig, auto_approve: bool) -> Result<()> {
    let stack_name = config.stack_name.as_str();
    let provider = provider_for(config).await;

    let Some(deployed) = provider
        .read(stack_name)
        .await
        .context("Failed to read deployed stack")?
    else {
        println!("{}", format!("Stack {} does not exist.", stack_name).green());
        return Ok(());
    };

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    println!(
        "  {} {} ({})",
        "-".red().bold(),
        deployed.name.bold(),
        deployed.status
    );

    let retained = retained_resources(config);
    if !retained.is_empty() {
        println!();
        println!("  {}", "Retained after deletion:".yellow());
        for (resource_type, logical_id) in retained {
            println!("    {} {}", resource_type, logical_id);
        }
    }
    println!();

    if !auto_approve
        && !confirm(
            "Do you really want to destroy this stack?",
            "This action cannot be undone. Type 'yes' to confirm.",
        )?
    {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", format!("Destroying {}...", stack_name).red().bold());
    let interpreter = Interpreter::new(provider);
    interpreter.destroy(stack_name).await?;

    println!();
    println!(
        "{}",
        format!("Destroy complete! {} deleted.", stack_name)
            .green()
            .bold()
    );
    Ok(())
}

fn confirm(question: &str, warning: &str) -> Result<bool> {
    println!("{}", question.yellow().bold());
    println!("  {}", warning.yellow());
    print!("\n  Enter a value: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    println!();
    Ok(input.trim() == "yes")
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for (construct, indices) in plan.group_by_construct() {
        println!("  {}", construct.bold());
        for idx in indices {
            let effect = &plan.effects()[idx];
            let id = effect.resource_id();
            println!(
                "    {} {} {}",
                colored_symbol(effect),
                id.resource_type.cyan(),
                id.name
            );
            if let Effect::Update {
                from,
                to,
                changed_attributes,
                ..
            } = effect
            {
                for key in changed_attributes {
                    let (before, after) = if key == DELETION_POLICY {
                        (
                            from.removal_policy.map(|p| p.as_cfn()).unwrap_or("(none)").to_string(),
                            to.removal_policy.map(|p| p.as_cfn()).unwrap_or("(none)").to_string(),
                        )
                    } else if key == DEPENDS_ON {
                        let mut declared = to.depends_on.clone();
                        declared.sort();
                        (format_depends_on(&from.depends_on), format_depends_on(&declared))
                    } else {
                        (
                            format_attribute(from.attributes.get(key)),
                            format_attribute(to.attributes.get(key)),
                        )
                    };
                    println!(
                        "        {}: {} → {}",
                        key,
                        before.red(),
                        after.green()
                    );
                }
            }
        }
    }

    if !plan.stack_changes().is_empty() {
        println!("  {}", "Stack".bold());
        for change in plan.stack_changes() {
            let symbol = match change {
                StackChange::OutputAdded(_) => change.symbol().green().bold(),
                StackChange::OutputRemoved(_) => change.symbol().red().bold(),
                _ => change.symbol().yellow().bold(),
            };
            let label = match change {
                StackChange::Description => "Description".to_string(),
                StackChange::OutputAdded(name)
                | StackChange::OutputChanged(name)
                | StackChange::OutputRemoved(name) => format!("Output {}", name),
            };
            println!("    {} {}", symbol, label);
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn format_depends_on(targets: &[String]) -> String {
    if targets.is_empty() {
        "(none)".to_string()
    } else {
        format!("[{}]", targets.join(", "))
    }
}

fn colored_symbol(effect: &Effect) -> colored::ColoredString {
    match effect {
        Effect::Create(_) => effect.symbol().green().bold(),
        Effect::Update { .. } => effect.symbol().yellow().bold(),
        Effect::Replace { .. } => effect.symbol().magenta().bold(),
        Effect::Delete(_) => effect.symbol().red().bold(),
    }
}

const MAX_ATTRIBUTE_WIDTH: usize = 60;

fn format_attribute(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return "(none)".to_string();
    };
    let text = template::value_to_json(value).to_string();
    if text.chars().count() > MAX_ATTRIBUTE_WIDTH {
        let truncated: String = text.chars().take(MAX_ATTRIBUTE_WIDTH).collect();
        format!("{}…", truncated)
    } else {
        text
    }
}

fn print_template_diff(
    previous: Option<&serde_json::Value>,
    desired: &serde_json::Value,
) -> Result<()> {
    let old = match previous {
        Some(template) => serde_json::to_string_pretty(template)?,
        None => String::new(),
    };
    let new = serde_json::to_string_pretty(desired)?;

    println!("{}", "Template diff:".cyan().bold());
    let diff = TextDiff::from_lines(&old, &new);
    for group in diff.grouped_ops(3) {
        println!("{}", "@@".dimmed());
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = change.to_string_lossy();
                let line = line.trim_end_matches('\n');
                match change.tag() {
                    ChangeTag::Delete => println!("{}", format!("-{}", line).red()),
                    ChangeTag::Insert => println!("{}", format!("+{}", line).green()),
                    ChangeTag::Equal => println!(" {}", line),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use learnings_core::resource::Resource;

    #[test]
    fn verbosity_maps_to_log_level() {
        assert_eq!(log_level(0), "warn");
        assert_eq!(log_level(1), "info");
        assert_eq!(log_level(2), "debug");
        assert_eq!(log_level(5), "debug");
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "learnings",
            "synth",
            "--stdout",
            "--pipeline",
            "--stack-name",
            "Other",
            "-vv",
        ]);
        assert!(cli.pipeline);
        assert_eq!(cli.stack_name.as_deref(), Some("Other"));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Synth { stdout: true, .. }));
    }

    #[test]
    fn template_is_named_after_stack() {
        assert_eq!(
            template_path(Path::new("cdk.out"), "CdkStack"),
            PathBuf::from("cdk.out/CdkStack.template.json")
        );
    }

    #[test]
    fn synth_writes_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StackConfig::container_only();
        run_synth(&config, dir.path(), false).unwrap();

        let body = fs::read_to_string(dir.path().join("CdkStack.template.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["Resources"]["Messages"]["Type"], "AWS::DynamoDB::Table");
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let cli = Cli::parse_from([
            "learnings",
            "validate",
            "--config",
            missing.to_str().unwrap(),
        ]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn pipeline_flag_needs_pipeline_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learnings.toml");
        fs::write(&path, "stack_name = \"Test\"\n").unwrap();
        let cli = Cli::parse_from([
            "learnings",
            "validate",
            "--pipeline",
            "--config",
            path.to_str().unwrap(),
        ]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn overrides_apply_to_loaded_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learnings.toml");
        fs::write(&path, "region = \"us-east-2\"\n").unwrap();
        let cli = Cli::parse_from([
            "learnings",
            "graph",
            "--config",
            path.to_str().unwrap(),
            "--region",
            "eu-west-1",
            "--stack-name",
            "Other",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.stack_name, "Other");
    }

    #[test]
    fn previous_template_yields_empty_plan() {
        let stack = build(&StackConfig::container_only()).unwrap();
        let synthesized = template::synthesize(&stack);
        assert!(plan_against(&stack, Some(&synthesized)).unwrap().is_empty());
        assert!(plan_against(&stack, Some(&serde_json::json!([]))).is_err());
    }

    #[test]
    fn removed_output_is_planned() {
        let stack = build(&StackConfig::container_only()).unwrap();
        let mut synthesized = template::synthesize(&stack);
        if let Some(outputs) = synthesized["Outputs"].as_object_mut() {
            outputs.remove("TableName");
        }
        let plan = plan_against(&stack, Some(&synthesized)).unwrap();
        assert_eq!(
            plan.stack_changes(),
            &[StackChange::OutputAdded("TableName".to_string())]
        );
    }

    #[test]
    fn deploy_prompt_only_warns_for_destructive_plans() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("AWS::S3::Bucket", "B")));
        let (_, warning) = deploy_prompt(&plan);
        assert!(!warning.contains("cannot be undone"));
        assert!(!warning.contains("cannot be recovered"));

        plan.add(Effect::Delete(learnings_core::resource::ResourceId::new(
            "AWS::S3::Bucket",
            "Old",
        )));
        let (question, warning) = deploy_prompt(&plan);
        assert!(question.contains("replaces or deletes"));
        assert!(warning.contains("cannot be recovered"));
    }

    #[test]
    fn retained_resources_tolerate_invalid_config() {
        let retained = retained_resources(&StackConfig::container_only());
        assert!(retained.iter().any(|(t, _)| t == "AWS::ECR::Repository"));
        assert!(!retained.iter().any(|(t, _)| t == "AWS::DynamoDB::Table"));

        let config = StackConfig {
            app_id: String::new(),
            ..StackConfig::container_only()
        };
        assert!(retained_resources(&config).is_empty());
    }

    #[test]
    fn depends_on_is_listed() {
        assert_eq!(format_depends_on(&[]), "(none)");
        assert_eq!(
            format_depends_on(&["Listener".to_string(), "TaskRole".to_string()]),
            "[Listener, TaskRole]"
        );
    }

    #[test]
    fn long_attributes_are_truncated() {
        let value = Value::string("x".repeat(100));
        let formatted = format_attribute(Some(&value));
        assert!(formatted.ends_with('…'));
        assert_eq!(format_attribute(None), "(none)");
        assert_eq!(
            format_attribute(Resource::new("AWS::S3::Bucket", "B")
                .with_attribute("A", Value::Int(3))
                .attribute("A")),
            "3"
        );
    }
}
