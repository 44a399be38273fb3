//! Command routing and execution

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::cli::args::{Cli, Commands, ShopItem};
use crate::config::CoreConfig;
use crate::course::{CourseId, Page};
use crate::evaluator::TestOutcome;
use crate::progress::Advance;
use crate::review::{ChatTranscript, HttpReviewClient, ReviewService};
use crate::session::{CoreServices, LessonSession, NextOutcome};
use crate::storage::{ModuleDocument, UserId};
use crate::user::UserState;

/// Execute a parsed command line
pub async fn execute_command(cli: Cli) -> Result<()> {
    let config = CoreConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let services = Arc::new(
        CoreServices::from_config(config)
            .await
            .context("Failed to open storage")?,
    );
    let uid = UserId::new(cli.user);

    match cli.command {
        Commands::Bootstrap { nickname, avatar } => {
            services
                .bootstrap
                .create_user_skeleton(&uid, &nickname, &avatar)
                .await?;
            println!("Created learner '{}' ({})", uid, nickname);
            Ok(())
        }
        Commands::Status { json } => run_status(&services, &uid, json).await,
        Commands::Answer {
            course,
            choice,
            code,
        } => run_answer(services, uid, course, choice, code).await,
        Commands::Hint { course } => {
            let session = LessonSession::open(services, uid, CourseId::new(course)).await?;
            match session.hint().await? {
                Some(hint) => println!("Hint: {}", hint),
                None => println!("No hint available"),
            }
            Ok(())
        }
        Commands::Buy { item } => run_buy(&services, &uid, item).await,
        Commands::Next { course } => run_next(services, uid, course).await,
        Commands::Regen { ticks } => run_regen(&services, uid, ticks).await,
        Commands::Achievements => {
            let achievements = services.achievements.list_achievements(&uid).await?;
            if achievements.is_empty() {
                println!("No achievements yet");
            }
            for (id, doc) in achievements {
                match doc.unlocked_at {
                    Some(at) if doc.unlocked => println!("[x] {} (unlocked {})", id, at),
                    _ if doc.unlocked => println!("[x] {}", id),
                    _ => println!("[ ] {}", id),
                }
            }
            Ok(())
        }
        Commands::Review { chat: true, .. } => run_chat(&services).await,
        Commands::Review {
            task, code, ask, ..
        } => run_review(&services, task, code, ask).await,
        Commands::ImportCourse { course, file } => {
            run_import(&services, CourseId::new(course), &file).await
        }
    }
}

async fn run_status(services: &CoreServices, uid: &UserId, json: bool) -> Result<()> {
    let state = services.ledger.snapshot(uid).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    print_status(services, &state);
    Ok(())
}

fn print_status(services: &CoreServices, state: &UserState) {
    let policy = services.ledger.policy();
    let remaining = policy.remaining(state.lives, state.last_life_restore, services.clock.now());

    if let Some(nickname) = &state.nickname {
        println!("Learner: {}", nickname);
    }
    println!("Lives: {}/{}", state.lives, policy.max_lives);
    println!("Hints: {}", state.hints);
    println!("Coins: {}", state.coins);
    if !remaining.is_zero() {
        println!("Next life in: {}s", remaining.as_secs());
    }
    for (course, position) in &state.progress {
        println!(
            "Course {}: module {}, page {}",
            course, position.module_index, position.page_index
        );
    }
    println!("Completed modules: {}", state.completed_modules.len());
}

async fn run_answer(
    services: Arc<CoreServices>,
    uid: UserId,
    course: String,
    choice: Option<usize>,
    code: Option<String>,
) -> Result<()> {
    let session = LessonSession::open(services, uid, CourseId::new(course)).await?;

    match (session.current_page(), choice, code) {
        (Some(Page::Test { .. }), Some(choice), _) => match session.answer(choice).await? {
            TestOutcome::Correct { reward } => println!("Correct! +{} coins", reward),
            TestOutcome::Wrong => println!("Wrong answer, one life lost"),
            TestOutcome::NoLives => println!("Wrong answer. No lives left"),
        },
        (Some(Page::CodingTask { .. }), _, Some(code)) => {
            if session.submit_code(&code).await? {
                println!("Correct!");
            } else {
                println!("Not quite, compare with the task description");
            }
        }
        (Some(page), _, _) => bail!(
            "The current page is a {} page; use --choice for tests and --code for coding tasks",
            page.kind()
        ),
        (None, _, _) => bail!("The course is finished"),
    }
    Ok(())
}

async fn run_buy(services: &CoreServices, uid: &UserId, item: ShopItem) -> Result<()> {
    let item = item.into();
    if services.shop.buy(uid, item).await? {
        println!(
            "Bought one {} for {} coins",
            item.name(),
            services.shop.price(item)
        );
    } else {
        println!(
            "Not enough coins: a {} costs {}",
            item.name(),
            services.shop.price(item)
        );
    }
    Ok(())
}

async fn run_next(services: Arc<CoreServices>, uid: UserId, course: String) -> Result<()> {
    let mut session = LessonSession::open(services, uid, CourseId::new(course)).await?;

    match session.next().await? {
        NextOutcome::NoLives => println!("No lives left, wait for one to regenerate or buy one"),
        NextOutcome::Moved(Advance::Terminal) => println!("Course already finished"),
        NextOutcome::Moved(Advance::Finished { completed }) => {
            println!("Completed module {}. Course finished!", completed)
        }
        NextOutcome::Moved(step) => {
            if let Some(completed) = step.completed() {
                println!("Completed module {}", completed);
            }
            let position = session.position();
            let kind = session.current_page().map(Page::kind).unwrap_or("none");
            println!(
                "Now at module {}, page {} ({})",
                position.module_index, position.page_index, kind
            );
        }
    }
    Ok(())
}

async fn run_regen(services: &CoreServices, uid: UserId, ticks: Option<u32>) -> Result<()> {
    let handle = services.regen.spawn(uid.clone());
    let mut countdown = handle.countdown();
    let mut seen = 0u32;
    info!(%uid, "regeneration running");

    loop {
        tokio::select! {
            changed = countdown.changed() => {
                if changed.is_err() {
                    break;
                }
                let remaining: Duration = *countdown.borrow_and_update();
                let state = services.ledger.resources(&uid).await?;
                println!("lives {} | next life in {}s", state.lives(), remaining.as_secs());

                seen += 1;
                if ticks.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.cancel().await;
    Ok(())
}

async fn run_review(
    services: &CoreServices,
    task: Option<String>,
    code: Option<String>,
    ask: Option<String>,
) -> Result<()> {
    let client = HttpReviewClient::new(&services.config.review)?;

    let answer = match (task, code, ask) {
        (Some(task), Some(code), _) => client.review(&task, &code).await,
        (_, _, Some(prompt)) => client.ask(&prompt).await,
        _ => bail!("Pass --task and --code, or --ask"),
    };

    match answer {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) if e.is_timeout() => bail!("The assistant did not answer in time, try again later"),
        Err(e) => Err(e.into()),
    }
}

async fn run_chat(services: &CoreServices) -> Result<()> {
    let client = HttpReviewClient::new(&services.config.review)?;
    let mut transcript = ChatTranscript::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        match transcript.send(&client, prompt).await {
            Ok(reply) => println!("{}", reply.text),
            Err(e) if e.is_timeout() => eprintln!("Assistant unavailable: no answer in time"),
            Err(e) => eprintln!("Assistant unavailable: {}", e),
        }
    }

    info!(messages = transcript.messages().len(), "chat ended");
    Ok(())
}

async fn run_import(services: &CoreServices, course: CourseId, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let modules: Vec<ModuleDocument> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a list of modules", file.display()))?;

    let count = modules.len();
    services.store.put_modules(&course, modules).await?;
    println!("Imported {} modules into course {}", count, course);
    Ok(())
}
