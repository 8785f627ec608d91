use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
pub use preview_server::ServeArgs;
use template_compiler::{
    ClientConfig, CompilerConfig, ErrorEnvelope, ModuleRequest, OverrideFailurePolicy,
    PreviewPayload, RenderOptions, TemplateCompiler,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "template-preview", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile one template and print the result as JSON
    Compile(CompileArgs),
    /// Run the preview HTTP server
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    /// Template entry file
    pub entry: PathBuf,

    /// Override set whose unpublished edits take precedence over disk
    #[arg(long = "override-set")]
    pub override_set: Option<String>,

    /// Editing service that serves override sets
    #[arg(long, env = "PREVIEW_OVERRIDE_API")]
    pub override_api: Option<String>,

    /// Fail when the override set cannot be fetched
    #[arg(long)]
    pub require_overrides: bool,

    /// Render the extracted component after compiling
    #[arg(long)]
    pub render: bool,

    /// Props passed to the component, as JSON
    #[arg(long, default_value = "{}")]
    pub props: String,

    /// Render plain text instead of HTML
    #[arg(long)]
    pub plain_text: bool,

    /// Indent the rendered HTML
    #[arg(long)]
    pub pretty: bool,

    /// Deadline for bundling plus execution, in seconds
    #[arg(long, default_value = "10")]
    pub timeout: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid props: {0}")]
    InvalidProps(#[source] serde_json::Error),
    #[error("Compiler error: {0}")]
    Compiler(#[from] template_compiler::Error),
    #[error("Server error: {0}")]
    Server(#[from] preview_server::ServerError),
}

/// What `compile` prints: the success payload or an `{error}` envelope.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CompileOutput {
    Success(PreviewPayload),
    Failure(ErrorEnvelope),
}

impl CompileOutput {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileOutput::Success(_))
    }
}

fn compiler_config(timeout: u64, override_api: Option<&str>) -> CompilerConfig {
    let config = CompilerConfig::default().with_timeout(Duration::from_secs(timeout));
    match override_api {
        Some(api_url) => config.with_override_api(ClientConfig::new(api_url)),
        None => config,
    }
}

pub async fn compile(args: &CompileArgs) -> Result<CompileOutput, Error> {
    let props: serde_json::Value = serde_json::from_str(&args.props).map_err(Error::InvalidProps)?;

    let mut config = compiler_config(args.timeout, args.override_api.as_deref())
        .with_max_concurrent_compiles(1);
    if args.require_overrides {
        config = config.with_override_failure_policy(OverrideFailurePolicy::Fail);
    }
    let compiler = TemplateCompiler::new(config)?;

    let mut request = ModuleRequest::new(&args.entry);
    request.override_set_id = args.override_set.clone();

    let preview = match compiler.compile_and_execute(request).await {
        Ok(preview) => preview,
        Err(error) => return Ok(CompileOutput::Failure(error.into())),
    };

    let markup = if args.render {
        let options = RenderOptions {
            pretty: args.pretty,
            plain_text: args.plain_text,
        };
        match preview.render(props, options).await {
            Ok(markup) => Some(markup),
            Err(error) => return Ok(CompileOutput::Failure(error.into())),
        }
    } else {
        None
    };

    info!("Compiled {}", args.entry.display());
    Ok(CompileOutput::Success(preview.payload(markup)))
}

pub async fn serve(args: &ServeArgs) -> Result<(), Error> {
    let app = preview_server::create_app(args.compiler_config())?;
    preview_server::run_server(app, args.addr).await?;
    Ok(())
}
