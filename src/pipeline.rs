//! Sequences the drafter and reviewer calls and applies the resulting edits.
//!
//! The flow is strictly linear: the reviewer request is not issued until the
//! drafter stream has fully resolved, and patching waits for the reviewer
//! stream. A stage failure aborts the run at that stage; there are no
//! retries.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::config::Config;
use crate::extract::extract_code;
use crate::patch::{SED_GRAMMAR, apply_patches, parse_patches};
use crate::stream::stream_request;

const DRAFTER_SYSTEM: &str = "You are a coding engine. Output code only.";
const REVIEWER_SYSTEM: &str = "You are a code fixer.\n\
    If logic errors exist, output replacements using: s/old code/new code/\n\
    If no errors, output nothing.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: String,
    grammar: &'a str,
    n_predict: u32,
    temperature: f32,
    stream: bool,
    cache_prompt: bool,
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reviewer edits parsed and applied.
    Patched { code: String },
    /// Reviewer emitted nothing; the draft stands as-is.
    Clean { code: String },
    /// Reviewer emitted text but no well-formed edit; the draft is kept.
    Unparsed { code: String },
    /// Drafter request failed or produced no usable code.
    DrafterFailed,
    /// Reviewer request failed; the unreviewed draft is the best output.
    ReviewerFailed { code: String },
}

impl Outcome {
    /// Process exit code for this outcome. The 0/1 split between the two
    /// success shapes follows the grep convention: 0 when edits were found
    /// and applied, 1 when the draft came back clean.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Patched { .. } => 0,
            Outcome::Clean { .. } => 1,
            Outcome::DrafterFailed => 2,
            Outcome::ReviewerFailed { .. } => 3,
            Outcome::Unparsed { .. } => 4,
        }
    }
}

/// ChatML prompt for the reviewer's raw completion endpoint.
fn review_prompt(draft: &str) -> String {
    format!(
        "<|im_start|>system\n{REVIEWER_SYSTEM}\n<|im_end|>\n\
         <|im_start|>user\n{draft}\n<|im_end|>\n\
         <|im_start|>assistant\n"
    )
}

/// Run the full draft, review, patch pipeline, writing progress and results
/// to `out`.
///
/// Only observer write failures and client construction surface as `Err`;
/// model-side failures are regular [`Outcome`]s.
pub async fn run<W>(cfg: &Config, out: &mut W) -> anyhow::Result<Outcome>
where
    W: AsyncWrite + Unpin,
{
    let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;

    // DRAFTING
    let draft_req = ChatRequest {
        messages: vec![
            ChatMessage {
                role: "system",
                content: DRAFTER_SYSTEM,
            },
            ChatMessage {
                role: "user",
                content: &cfg.task,
            },
        ],
        max_tokens: cfg.drafter_max_tokens,
        temperature: cfg.drafter_temperature,
        stream: true,
    };
    let raw_draft =
        match stream_request(&client, "drafter", &cfg.drafter_url, &draft_req, out).await {
            Ok(res) => {
                res.report("drafter", out).await?;
                res.text
            }
            Err(e) => {
                warn!(error = %e, "drafter stage failed");
                out.write_all(format!("\ndrafter failed: {e}\n").as_bytes())
                    .await?;
                return Ok(Outcome::DrafterFailed);
            }
        };

    let draft = extract_code(&raw_draft);
    if draft.is_empty() {
        out.write_all(b"\ndrafter produced no code\n").await?;
        return Ok(Outcome::DrafterFailed);
    }
    debug!(%draft, "extracted draft");

    // REVIEWING
    let review_req = CompletionRequest {
        prompt: review_prompt(&draft),
        grammar: SED_GRAMMAR,
        n_predict: cfg.reviewer_n_predict,
        temperature: cfg.reviewer_temperature,
        stream: true,
        cache_prompt: true,
    };
    let review =
        match stream_request(&client, "reviewer", &cfg.reviewer_url, &review_req, out).await {
            Ok(res) => {
                res.report("reviewer", out).await?;
                res.text
            }
            Err(e) => {
                warn!(error = %e, "reviewer stage failed");
                out.write_all(
                    format!("\nreviewer failed: {e}\nunreviewed draft:\n{draft}\n").as_bytes(),
                )
                .await?;
                return Ok(Outcome::ReviewerFailed { code: draft });
            }
        };

    // PATCHING
    if review.is_empty() {
        out.write_all(b"\nno issues found\n").await?;
        out.flush().await?;
        return Ok(Outcome::Clean { code: draft });
    }
    let ops = parse_patches(&review);
    if ops.is_empty() {
        warn!(%review, "reviewer output contained no well-formed edits");
        out.write_all(b"\nreviewer output did not parse; keeping draft\n")
            .await?;
        out.flush().await?;
        return Ok(Outcome::Unparsed { code: draft });
    }
    let fixed = apply_patches(&draft, &ops);
    out.write_all(format!("\nfixed code:\n{fixed}\n").as_bytes())
        .await?;
    out.flush().await?;
    Ok(Outcome::Patched { code: fixed })
}
