use crate::constants::codegen::{OPENAPI_GENERATOR_CLI, OPENAPI_GENERATOR_IMAGE, TYPESCRIPT_CODEGEN};
use crate::errors::CommandError;
use crate::services::logger::Logger;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Generator {
    #[serde(rename = "openapi-typescript-codegen")]
    TypescriptCodegen,
    #[serde(rename = "@openapitools/openapi-generator-cli")]
    OpenApiGeneratorCli,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ts,
    Js,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpClientKind {
    Fetch,
    Xhr,
    Node,
    Axios,
}

impl HttpClientKind {
    fn as_str(self) -> &'static str {
        match self {
            HttpClientKind::Fetch => "fetch",
            HttpClientKind::Xhr => "xhr",
            HttpClientKind::Node => "node",
            HttpClientKind::Axios => "axios",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeGenConfig {
    pub generator: Generator,
    pub language: Language,
    pub input: String,
    pub output: String,
    pub client: HttpClientKind,
    #[serde(default)]
    pub use_options: bool,
    #[serde(default)]
    pub use_union_types: bool,
    #[serde(default)]
    pub export_core: bool,
    #[serde(default)]
    pub export_schemas: bool,
    #[serde(default)]
    pub export_models: bool,
    #[serde(default)]
    pub export_services: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postfix_services: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postfix_models: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeGenResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, config: &CodeGenConfig) -> Result<CodeGenResult, CommandError>;
}

/// One process to run: program, arguments, and the directory it writes into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub output_dir: PathBuf,
}

fn is_remote(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn absolutize(root: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

pub fn typescript_codegen_args(config: &CodeGenConfig) -> Vec<String> {
    let mut args = vec![TYPESCRIPT_CODEGEN.to_string()];
    if !config.input.is_empty() {
        args.extend(["--input".to_string(), config.input.clone()]);
    }
    args.extend(["--output".to_string(), config.output.clone()]);
    args.extend(["--client".to_string(), config.client.as_str().to_string()]);
    let flags = [
        (config.use_options, "--useOptions"),
        (config.use_union_types, "--useUnionTypes"),
        (config.export_core, "--exportCore"),
        (config.export_schemas, "--exportSchemas"),
        (config.export_models, "--exportModels"),
        (config.export_services, "--exportServices"),
    ];
    for (enabled, flag) in flags {
        if enabled {
            args.push(flag.to_string());
        }
    }
    let valued = [
        ("--postfixServices", &config.postfix_services),
        ("--postfixModels", &config.postfix_models),
        ("--indent", &config.indent),
    ];
    for (flag, value) in valued {
        if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
            args.extend([flag.to_string(), value.clone()]);
        }
    }
    args
}

pub fn plan_invocation(config: &CodeGenConfig, workspace_root: &Path) -> Invocation {
    let output_dir = absolutize(workspace_root, &config.output);
    match config.generator {
        Generator::TypescriptCodegen => Invocation {
            program: "npx".to_string(),
            args: typescript_codegen_args(config),
            output_dir,
        },
        Generator::OpenApiGeneratorCli => {
            let generator_name = match config.language {
                Language::Ts => "typescript-fetch",
                Language::Js => "javascript",
            };
            if is_remote(&config.input) {
                Invocation {
                    program: "docker".to_string(),
                    args: vec![
                        "run".into(),
                        "--rm".into(),
                        "-v".into(),
                        format!("{}:/output", output_dir.display()),
                        OPENAPI_GENERATOR_IMAGE.into(),
                        "generate".into(),
                        "-i".into(),
                        config.input.clone(),
                        "-o".into(),
                        "/output".into(),
                        "-g".into(),
                        generator_name.into(),
                    ],
                    output_dir,
                }
            } else {
                let input = absolutize(workspace_root, &config.input);
                Invocation {
                    program: "npx".to_string(),
                    args: vec![
                        OPENAPI_GENERATOR_CLI.into(),
                        "generate".into(),
                        "-g".into(),
                        generator_name.into(),
                        "-i".into(),
                        input.display().to_string(),
                        "-o".into(),
                        output_dir.display().to_string(),
                    ],
                    output_dir,
                }
            }
        }
    }
}

/// Relative paths of every file under `dir`; empty when it does not exist.
pub fn generated_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .ok()
                .map(|rel| rel.display().to_string())
        })
        .collect();
    files.sort();
    files
}

/// Runs generators through `npx` or `docker` from a workspace root.
pub struct ProcessCodeGenerator {
    logger: Logger,
    workspace_root: PathBuf,
}

impl ProcessCodeGenerator {
    pub fn new(logger: Logger, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            logger: logger.child("codegen"),
            workspace_root: workspace_root.into(),
        }
    }

    async fn ensure_available(&self, program: &str) -> Result<(), CommandError> {
        let status = Command::new(program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(CommandError::denied(format!("{} is required but not available", program))
                .with_hint(match program {
                    "docker" => "Install Docker: https://docs.docker.com/get-docker/",
                    _ => "Install Node.js so that npx is on PATH",
                })),
        }
    }
}

#[async_trait]
impl CodeGenerator for ProcessCodeGenerator {
    async fn generate(&self, config: &CodeGenConfig) -> Result<CodeGenResult, CommandError> {
        if config.output.trim().is_empty() {
            return Err(CommandError::invalid_params("output must be a non-empty path"));
        }
        let invocation = plan_invocation(config, &self.workspace_root);
        self.ensure_available(&invocation.program).await?;
        tokio::fs::create_dir_all(&invocation.output_dir).await?;

        self.logger.info(
            "running code generator",
            Some(&serde_json::json!({"program": invocation.program, "args": invocation.args})),
        );
        let started = Instant::now();
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&self.workspace_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;
        let duration = started.elapsed().as_millis() as u64;

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                return Ok(CodeGenResult {
                    success: false,
                    error: Some(format!("{} execution error: {}", invocation.program, err)),
                    duration: Some(duration),
                    ..CodeGenResult::default()
                })
            }
        };
        let success = output.status.success();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let files = if success {
            generated_files(&invocation.output_dir)
        } else {
            Vec::new()
        };
        Ok(CodeGenResult {
            success,
            output: (!stdout.is_empty()).then_some(stdout),
            error: (!stderr.is_empty()).then_some(stderr),
            files: Some(files),
            duration: Some(duration),
        })
    }
}
