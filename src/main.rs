//! veil-core command line entry point.
//!
//! The library is embedded by a host application that brings its own chat
//! transport and storage; this binary exists for local inspection:
//!
//! - `veil-core-cli` or `veil-core-cli demo` - stream a scripted exchange
//!   and print the SSE frames a client would receive
//! - `veil-core-cli config show` - print the effective configuration
//! - `veil-core-cli version` - show version information

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use veil_core::chat::{
    ChatClient, ChatCompletion, ChatDelta, ChatError, ChatRequest, ChatUsage, DeltaStream,
};
use veil_core::config;
use veil_core::events::{encode_frame, StreamEvent};
use veil_core::pii::mask_text;
use veil_core::stream::StreamRequest;
use veil_core::telemetry::{init_logging, init_metrics, LogConfig};
use veil_core::Pipeline;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("demo");

    match command {
        "demo" | "" => {
            if let Err(e) = init_logging(&LogConfig::from_env()) {
                eprintln!("Failed to initialize logging: {}", e);
                return ExitCode::FAILURE;
            }
            init_metrics();
            let code = run_demo().await;
            ExitCode::from(code as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    run_config_show();
                    ExitCode::SUCCESS
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_usage();
                    ExitCode::FAILURE
                }
            }
        }
        "version" | "--version" | "-V" => {
            println!("veil-core {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "veil-core - streaming PII redaction pipeline v{}

USAGE:
    veil-core-cli [COMMAND]

COMMANDS:
    demo         Stream a scripted exchange and print its SSE frames (default)
    config show  Print the effective configuration
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    VEIL_LOG_FORMAT     Log output format: json, pretty (default: json)
    VEIL_LOG_LEVEL      Log level filter (default: info)
    VEIL_PII_ENABLED    Enable sensitive-data detection (default: false)
    VEIL_PII_MODEL      Detection model id
    VEIL_CHAT_MODEL     Default chat model id

    See `veil-core-cli config show` for the full variable list.

EXIT CODES:
    0  Success
    1  Failure
",
        version
    );
}

fn run_config_show() {
    let eff = config::load().effective_config();
    println!("pii.enabled                        = {}", eff.pii_enabled);
    println!("pii.model                          = {}", eff.pii_model);
    println!("pii.max_batch_chars                = {}", eff.pii_max_batch_chars);
    println!("pii.batch_deltas                   = {}", eff.pii_batch_deltas);
    println!("pii.timeout_ms                     = {}", eff.pii_timeout_ms);
    println!("pii.fallback                       = {}", eff.pii_fallback);
    println!("pii.min_confidence                 = {}", eff.pii_min_confidence);
    println!("chat.model                         = {}", eff.chat_model);
    println!("chat.context_window                = {}", eff.chat_context_window);
    println!("chat.max_message_chars             = {}", eff.chat_max_message_chars);
    println!("chat.max_messages_per_conversation = {}", eff.chat_max_messages_per_conversation);
    println!("chat.daily_token_limit             = {}", eff.chat_daily_token_limit);
    println!("chat.requests_per_minute           = {}", eff.chat_requests_per_minute);
}

/// Chat transport for the demo. Streamed completions play back a canned
/// reply; non-streamed completions are the detector's calls and answer
/// with the findings for that reply.
struct DemoChat;

const DEMO_REPLY: &[&str] = &[
    "Sure. ",
    "Your onboarding contact is ",
    "Maya Lindqvist, ",
    "reachable at ",
    "maya.lindqvist@northwind.dev ",
    "or 555-0198. ",
    "She works Tuesdays and Thursdays.",
];

const DEMO_FINDINGS: &str = r#"[
    {"piiType": "email", "value": "maya.lindqvist@northwind.dev", "confidence": 0.99},
    {"piiType": "phone", "value": "555-0198", "confidence": 0.95},
    {"piiType": "full_name", "value": "Maya Lindqvist", "confidence": 0.9}
]"#;

#[async_trait]
impl ChatClient for DemoChat {
    async fn stream_completion(&self, _request: ChatRequest) -> Result<DeltaStream, ChatError> {
        let mut deltas: Vec<Result<ChatDelta, ChatError>> = DEMO_REPLY
            .iter()
            .map(|part| Ok(ChatDelta::Content((*part).to_string())))
            .collect();
        deltas.push(Ok(ChatDelta::Usage(ChatUsage {
            prompt_tokens: 42,
            completion_tokens: 31,
            total_tokens: 73,
        })));
        Ok(stream::iter(deltas).boxed())
    }

    async fn complete(&self, _request: ChatRequest) -> Result<ChatCompletion, ChatError> {
        Ok(ChatCompletion {
            content: DEMO_FINDINGS.to_string(),
            usage: None,
        })
    }
}

async fn run_demo() -> i32 {
    let mut config = config::load();
    // The demo exists to show masking; detection is on regardless of env.
    config.detection.enabled = true;

    let chat: Arc<dyn ChatClient> = Arc::new(DemoChat);
    let pipeline = Pipeline::new(config, chat);

    let conversation_id = pipeline.messages.create_conversation("demo-user", None);
    let request = StreamRequest {
        user_id: "demo-user".to_string(),
        conversation_id,
        message: "Who is my onboarding contact?".to_string(),
        model: None,
    };

    let mut handle = match pipeline.orchestrator.start_stream(request).await {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Stream rejected: {}", e);
            return 1;
        }
    };

    let mut transcript = String::new();
    let mut regions = Vec::new();
    while let Some(event) = handle.next_event().await {
        let terminal = event.is_terminal();
        match &event {
            StreamEvent::Content { content } => transcript.push_str(content),
            StreamEvent::PiiMask { region } => regions.push(region.clone()),
            _ => {}
        }
        match encode_frame(&event) {
            Ok(frame) => print!("{}", frame),
            Err(e) => {
                eprintln!("Frame encoding failed: {}", e);
                return 1;
            }
        }
        if terminal {
            break;
        }
    }

    eprintln!("Redacted rendering:\n{}", mask_text(&transcript, &regions));

    match pipeline.audit.export_json().await {
        Ok(json) => eprintln!("Audit trail:\n{}", json),
        Err(e) => {
            eprintln!("Audit export failed: {}", e);
            return 1;
        }
    }
    0
}
