use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use keel_core::effect::Effect;
use keel_core::interpreter::{EffectOutcome, Interpreter, InterpreterConfig};
use keel_core::plan::Plan;
use keel_core::resource::{Resource, ResourceId, State, Value};
use keel_stack::outputs::outputs_to_json;
use keel_stack::simulate::DEFAULT_STATE_FILE;
use keel_stack::{
    ConfigSource, Derivation, SimulatedProvider, StackConfig, StaticZones, derive_stack,
    resolve_outputs,
};

#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Derive, preview and materialize the web application stack", long_about = None)]
struct Cli {
    /// Path to the JSON configuration
    #[arg(long, global = true, default_value = "keel.json")]
    config: PathBuf,

    /// Override a configuration value (key=value, repeatable)
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// State file of the simulated provider
    #[arg(long, global = true, default_value = DEFAULT_STATE_FILE)]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and the derived stack
    Validate,
    /// Show execution plan without applying changes
    Plan,
    /// Show the dependency graph of the derived stack
    Graph {
        /// Print the desired-state graph as JSON
        #[arg(long)]
        json: bool,
    },
    /// Materialize the stack
    Apply,
    /// Destroy every materialized resource
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Show exported outputs of the materialized stack
    Outputs {
        /// Reveal sensitive outputs
        #[arg(long)]
        show_secrets: bool,

        /// Print outputs as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let ctx = Context {
        config: cli.config,
        overrides: cli.overrides,
        state: cli.state,
    };

    let result = match cli.command {
        Commands::Validate => run_validate(&ctx).await,
        Commands::Plan => run_plan(&ctx).await,
        Commands::Graph { json } => run_graph(&ctx, json).await,
        Commands::Apply => run_apply(&ctx).await,
        Commands::Destroy { auto_approve } => run_destroy(&ctx, auto_approve).await,
        Commands::Outputs { show_secrets, json } => run_outputs(&ctx, show_secrets, json).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Global options shared by every command
struct Context {
    config: PathBuf,
    overrides: Vec<String>,
    state: PathBuf,
}

fn load_config(path: &Path, overrides: &[String]) -> Result<StackConfig, String> {
    let mut source = ConfigSource::load(path).map_err(|e| e.to_string())?;
    log::debug!(
        "Loaded configuration from {} ({} overrides)",
        path.display(),
        overrides.len()
    );
    for assignment in overrides {
        source
            .apply_override(assignment)
            .map_err(|e| e.to_string())?;
    }
    StackConfig::from_source(&source).map_err(|e| e.to_string())
}

async fn derive(ctx: &Context) -> Result<(StackConfig, Derivation), String> {
    let config = load_config(&ctx.config, &ctx.overrides)?;
    let zones = StaticZones::from_config(&config);
    let derivation = derive_stack(&config, &zones)
        .await
        .map_err(|e| e.to_string())?;

    for failure in &derivation.failures {
        println!("{} {}", "Warning:".yellow().bold(), failure);
    }
    Ok((config, derivation))
}

fn open_provider(ctx: &Context, config: &StackConfig) -> Result<SimulatedProvider, String> {
    log::debug!("Using state file {}", ctx.state.display());
    SimulatedProvider::open(&config.region, &ctx.state).map_err(|e| e.to_string())
}

fn validate_stack(derivation: &Derivation) -> Result<(), String> {
    derivation.stack.validate().map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    })
}

async fn run_validate(ctx: &Context) -> Result<(), String> {
    let (_, derivation) = derive(ctx).await?;
    validate_stack(&derivation)?;

    println!(
        "{}",
        format!(
            "✓ {} resources and {} outputs validated successfully.",
            derivation.stack.resources().len(),
            derivation.stack.outputs().len()
        )
        .green()
        .bold()
    );
    Ok(())
}

async fn run_plan(ctx: &Context) -> Result<(), String> {
    let (config, derivation) = derive(ctx).await?;
    validate_stack(&derivation)?;

    let states = open_provider(ctx, &config)?.states();
    let plan = derivation.stack.plan().map_err(|e| e.to_string())?;
    let pending = pending_effects(&plan, &states);

    if pending.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return Ok(());
    }

    print_plan(&pending);
    Ok(())
}

async fn run_graph(ctx: &Context, json: bool) -> Result<(), String> {
    let (_, derivation) = derive(ctx).await?;
    let stack = &derivation.stack;

    if json {
        let content =
            serde_json::to_string_pretty(&stack.to_json()).map_err(|e| e.to_string())?;
        println!("{}", content);
        return Ok(());
    }

    let graph = stack.graph();
    let order = graph.topological_order().map_err(|e| e.to_string())?;
    for name in order {
        let Some(resource) = stack.get(&name) else {
            continue;
        };
        println!("{}", resource.id.to_string().cyan().bold());
        for target in graph.targets_of(&name) {
            println!("  {} {}", "<-".dimmed(), target);
        }
    }
    Ok(())
}

async fn run_apply(ctx: &Context) -> Result<(), String> {
    let (config, derivation) = derive(ctx).await?;
    validate_stack(&derivation)?;

    let provider = open_provider(ctx, &config)?;
    let states = provider.states();
    let plan = derivation.stack.plan().map_err(|e| e.to_string())?;
    let pending = pending_effects(&plan, &states);
    log::debug!(
        "{} of {} resources already materialized",
        plan.effects().len() - pending.effects().len(),
        plan.effects().len()
    );

    if pending.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&pending);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let interpreter = Interpreter::new(provider)
        .with_config(InterpreterConfig {
            continue_on_error: true,
        })
        .with_states(states);
    let result = interpreter.apply(&plan).await;

    for (id, outcome) in &result.outcomes {
        match outcome {
            Ok(EffectOutcome::Created { .. }) => println!("  {} + {}", "✓".green(), id),
            Ok(EffectOutcome::Deleted) => println!("  {} - {}", "✓".green(), id),
            Ok(EffectOutcome::Skipped { .. }) => {}
            Err(e) => println!("  {} + {} - {}", "✗".red(), id, e),
        }
    }

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Apply complete! {} resources created.",
                pending.effects().len()
            )
            .green()
            .bold()
        );
    } else {
        let created = result
            .outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Ok(EffectOutcome::Created { .. })))
            .count();
        println!(
            "{}",
            format!(
                "Apply failed. {} created, {} failed.",
                created, result.failure_count
            )
            .red()
            .bold()
        );
    }

    println!();
    let resolved = resolve_outputs(derivation.stack.outputs(), &result.states);
    print_outputs(&resolved);
    Ok(())
}

async fn run_destroy(ctx: &Context, auto_approve: bool) -> Result<(), String> {
    let (config, derivation) = derive(ctx).await?;

    let provider = open_provider(ctx, &config)?;
    let states: HashMap<ResourceId, State> = provider
        .states()
        .into_values()
        .map(|state| (state.id.clone(), state))
        .collect();
    let plan = Plan::destroy(derivation.stack.resources(), &states).map_err(|e| e.to_string())?;

    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        let id = effect.resource_id();
        if derivation.stack.get(&id.name).is_some() {
            println!("  {} {}", "-".red().bold(), id);
        } else {
            println!(
                "  {} {} {}",
                "-".red().bold(),
                id,
                "(no longer declared)".dimmed()
            );
        }
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        plan.effects().len().to_string().red()
    );
    println!();

    if !auto_approve {
        println!(
            "{}",
            "Do you really want to destroy all resources?"
                .yellow()
                .bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let result = Interpreter::new(provider)
        .with_config(InterpreterConfig {
            continue_on_error: true,
        })
        .apply(&plan)
        .await;

    for (id, outcome) in &result.outcomes {
        match outcome {
            Ok(_) => println!("  {} - {}", "✓".green(), id),
            Err(e) => println!("  {} - {} - {}", "✗".red(), id, e),
        }
    }

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Destroy complete! {} resources destroyed.",
                result.success_count
            )
            .green()
            .bold()
        );
    } else {
        println!(
            "{}",
            format!(
                "Destroy failed. {} succeeded, {} failed.",
                result.success_count, result.failure_count
            )
            .red()
            .bold()
        );
    }

    Ok(())
}

async fn run_outputs(ctx: &Context, show_secrets: bool, json: bool) -> Result<(), String> {
    let (config, derivation) = derive(ctx).await?;
    let states = open_provider(ctx, &config)?.states();
    let resolved = resolve_outputs(derivation.stack.outputs(), &states);

    if json {
        let content = serde_json::to_string_pretty(&outputs_to_json(&resolved, show_secrets))
            .map_err(|e| e.to_string())?;
        println!("{}", content);
        return Ok(());
    }

    if show_secrets {
        let revealed: BTreeMap<_, _> = resolved
            .into_iter()
            .map(|(name, value)| (name, value.map(|v| v.expose().clone())))
            .collect();
        print_outputs(&revealed);
    } else {
        print_outputs(&resolved);
    }
    Ok(())
}

/// Effects of `plan` whose resources are not materialized yet
fn pending_effects(plan: &Plan, states: &HashMap<String, State>) -> Plan {
    let mut pending = Plan::new();
    for effect in plan.effects() {
        let materialized = states
            .get(&effect.resource_id().name)
            .is_some_and(|s| s.exists);
        if !materialized {
            pending.add(effect.clone());
        }
    }
    pending
}

fn print_plan(plan: &Plan) {
    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for (component, indices) in plan.component_groups() {
        println!("  {}", component.bold());
        for idx in indices {
            match &plan.effects()[idx] {
                Effect::Create(resource) => print_resource(resource),
                Effect::Delete { id, .. } => println!("    {} {}", "-".red().bold(), id),
            }
        }
        println!();
    }

    println!("{}", plan.summary().to_string().bold());
}

fn print_resource(resource: &Resource) {
    println!(
        "    {} {}",
        "+".green().bold(),
        resource.id.to_string().cyan().bold()
    );

    let mut attributes: Vec<(&String, &Value)> = resource.public_attributes().collect();
    attributes.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in attributes {
        let rendered = format_value(value);
        if value.is_deferred() {
            println!("        {}: {}", key, rendered.yellow());
        } else {
            println!("        {}: {}", key, rendered.green());
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Base64(_) => "(known after apply)".to_string(),
        other => other.to_string(),
    }
}

fn print_outputs(resolved: &BTreeMap<String, Result<Value, keel_core::resource::UnresolvedRef>>) {
    println!("{}", "Outputs:".cyan().bold());
    for (name, value) in resolved {
        match value {
            Ok(value) => println!("  {} = {}", name.bold(), value),
            Err(e) => println!("  {} = {}", name.bold(), format!("({})", e).dimmed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "region": "us-east-1",
        "name": "csye6225",
        "username": "csye6225",
        "password": "s3cret-pass",
        "appPort": 8080,
        "certificateArn": "arn:aws:acm:us-east-1:123456789012:certificate/abc",
        "ami": "ami-0abcdef1234567890",
        "keyPair": "webapp-key",
        "domain": "demo.example.com",
        "project": "webapp-project",
        "tableName": "emails",
        "mailgun_api_key": "key-mailgun"
    }"#;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("keel.json");
        std::fs::write(&path, CONFIG).unwrap();
        path
    }

    #[test]
    fn overrides_replace_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path());

        let config = load_config(
            &path,
            &["region=us-west-2".to_string(), "allowHttp=true".to_string()],
        )
        .unwrap();
        assert_eq!(config.region, "us-west-2");
        assert!(config.allow_http);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.json"), &[]).unwrap_err();
        assert!(err.contains("absent.json"));
    }

    #[test]
    fn pending_effects_skip_materialized_resources() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("aws.vpc", "custom")));
        plan.add(Effect::Create(Resource::new("aws.sns.topic", "my-topic")));

        let mut states = HashMap::new();
        states.insert(
            "custom".to_string(),
            State::existing(ResourceId::new("aws.vpc", "custom"), HashMap::new())
                .with_identifier("vpc-1"),
        );

        let pending = pending_effects(&plan, &states);
        assert_eq!(pending.effects().len(), 1);
        assert_eq!(pending.effects()[0].resource_id().name, "my-topic");
    }

    #[tokio::test]
    async fn derive_without_hosted_zone_warns_but_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context {
            config: write_config(dir.path()),
            overrides: vec![],
            state: dir.path().join("state.json"),
        };
        let (_, derivation) = derive(&ctx).await.unwrap();
        assert_eq!(derivation.failures.len(), 1);
        assert!(derivation.stack.get("alias").is_none());
        validate_stack(&derivation).unwrap();
    }
}
