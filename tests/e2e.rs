use clap::Parser;
use std::fs;
use std::path::PathBuf;
use template_preview::{compile, Cli, Command, CompileArgs, CompileOutput};

fn project(files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path().join("app");
    for (path, contents) in files {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    (dir, root)
}

fn compile_args(argv: &[&str]) -> CompileArgs {
    let cli = Cli::try_parse_from(argv).unwrap();
    match cli.command {
        Command::Compile(args) => args,
        other => panic!("expected compile, got {:?}", other),
    }
}

#[tokio::test]
async fn test_compile_and_render_from_command_line() -> anyhow::Result<()> {
    let (_dir, root) = project(&[
        (
            "emails/welcome.jsx",
            "import Footer from \"./footer\";\nexport default function Welcome({ name }) {\n  return <div><h1>{name}</h1><Footer /></div>;\n}\n",
        ),
        ("emails/footer.jsx", "export default () => <p>Bye</p>;\n"),
    ]);
    let entry = root.join("emails/welcome.jsx");
    let args = compile_args(&[
        "template-preview",
        "compile",
        entry.to_str().unwrap(),
        "--render",
        "--props",
        r#"{"name":"Ada"}"#,
    ]);

    let output = compile(&args).await?;
    assert!(output.is_success());

    let json = serde_json::to_value(&output)?;
    assert_eq!(json["componentName"], "Welcome");
    assert!(json["markup"]
        .as_str()
        .unwrap()
        .ends_with("<div><h1>Ada</h1><p>Bye</p></div>"));
    assert!(json["sourceMap"]["sources"]
        .as_array()
        .unwrap()
        .iter()
        .any(|source| source.as_str().unwrap().ends_with("emails/footer.jsx")));
    Ok(())
}

#[tokio::test]
async fn test_compile_failure_prints_envelope() -> anyhow::Result<()> {
    let (_dir, root) = project(&[(
        "emails/broken.jsx",
        "import Missing from \"./missing\";\nexport default Missing;\n",
    )]);
    let entry = root.join("emails/broken.jsx");
    let args = compile_args(&["template-preview", "compile", entry.to_str().unwrap()]);

    let output = compile(&args).await?;
    let CompileOutput::Failure(envelope) = &output else {
        panic!("expected a failure, got {:?}", output);
    };
    assert_eq!(envelope.error.name, "BuildError");
    assert_eq!(
        envelope.error.message,
        "Build failed with 1 error:\nemails/broken.jsx:1:20: ERROR: Could not resolve \"./missing\""
    );
    Ok(())
}

#[tokio::test]
async fn test_invalid_props_are_rejected() {
    let args = compile_args(&[
        "template-preview",
        "compile",
        "emails/welcome.jsx",
        "--props",
        "{not json",
    ]);
    assert!(matches!(
        compile(&args).await,
        Err(template_preview::Error::InvalidProps(_))
    ));
}

#[test]
fn test_serve_accepts_server_flags() {
    let cli = Cli::try_parse_from([
        "template-preview",
        "serve",
        "--addr",
        "127.0.0.1:4000",
        "--require-overrides",
        "--no-cache",
    ])
    .unwrap();
    let Command::Serve(args) = cli.command else {
        panic!("expected serve");
    };

    assert_eq!(args.addr.port(), 4000);
    let config = args.compiler_config();
    assert!(!config.cache_enabled);
    assert_eq!(
        config.override_failure_policy,
        template_compiler::OverrideFailurePolicy::Fail
    );
}
