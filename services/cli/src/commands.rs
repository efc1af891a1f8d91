use crate::cli::{AgentsCommand, Cli, Command, RestoreCommand, SpeakArgs, VoicesCommand, transcript};
use anyhow::{Context, bail};
use futures_util::{StreamExt, stream};
use neuphonic::{
    Client, CloneVoice, CreateAgent, Interrupt, Player, RestoreRequest, UpdateVoice, WavSink,
    create_client,
};
use serde::Serialize;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = create_client(cli.overrides()).context("Failed to load client configuration")?;

    match cli.command {
        Command::Speak(args) => speak(&client, args).await,
        Command::Voices(command) => voices(&client, command).await,
        Command::Agents(command) => agents(&client, command).await,
        Command::Restore(command) => restore(&client, command).await,
        Command::Jwt => {
            println!("{}", client.jwt().await?);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn speak(client: &Client, args: SpeakArgs) -> anyhow::Result<()> {
    let tts = args.tts_config();

    if args.sse {
        let audio = client.tts.sse(tts).send(&args.text.join(" ")).await?;
        std::fs::write(&args.output, audio.to_wav())
            .with_context(|| format!("Failed to write {}", args.output.display()))?;
        info!(path = %args.output.display(), bytes = audio.audio.len(), "Audio written");
        return Ok(());
    }

    let session = client.tts.websocket(tts, args.session_config()).await?;
    let mut speeches = Vec::with_capacity(args.text.len());
    for text in &args.text {
        speeches.push(session.send_with_stop(text).await?);
    }
    let completed = session.wait();

    let interrupt = Interrupt::new();
    let on_ctrl_c = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.trigger();
        }
    });

    let mut player = Player::new(WavSink::new(&args.output));
    let report = player
        .play(stream::iter(speeches).flatten(), &interrupt)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if report.interrupted {
        session.stop();
        session.close().await?;
        bail!("Interrupted, nothing written");
    }
    if !completed.await {
        warn!("Some requests ended before their audio was complete");
    }
    session.close().await?;

    info!(
        path = %args.output.display(),
        chunks = report.chunks,
        seconds = report.duration.as_secs_f32(),
        "Audio written"
    );
    Ok(())
}

async fn voices(client: &Client, command: VoicesCommand) -> anyhow::Result<()> {
    match command {
        VoicesCommand::List => print_json(&client.voices.list().await?),
        VoicesCommand::Get(selector) => {
            print_json(&client.voices.get(&selector.to_id_or_name()).await?)
        }
        VoicesCommand::Clone { name, file, tags } => {
            let message = client
                .voices
                .clone_voice(CloneVoice { name, file, tags })
                .await?;
            println!("{message}");
            Ok(())
        }
        VoicesCommand::Update {
            voice,
            file,
            new_name,
            tags,
        } => {
            let updated = client
                .voices
                .update(UpdateVoice {
                    voice: voice.to_id_or_name(),
                    new_file: file,
                    new_name,
                    new_tags: tags,
                })
                .await?;
            report("updated", updated)
        }
        VoicesCommand::Delete(selector) => {
            report("deleted", client.voices.delete(&selector.to_id_or_name()).await?)
        }
    }
}

async fn agents(client: &Client, command: AgentsCommand) -> anyhow::Result<()> {
    match command {
        AgentsCommand::List => print_json(&client.agents.list().await?),
        AgentsCommand::Get { id } => print_json(&client.agents.get(&id).await?),
        AgentsCommand::Create {
            name,
            prompt,
            greeting,
        } => {
            let id = client
                .agents
                .create(CreateAgent {
                    name,
                    prompt,
                    greeting,
                })
                .await?;
            println!("{id}");
            Ok(())
        }
        AgentsCommand::Delete { id } => report("deleted", client.agents.delete(&id).await?),
    }
}

async fn restore(client: &Client, command: RestoreCommand) -> anyhow::Result<()> {
    match command {
        RestoreCommand::Submit {
            audio,
            transcript: text,
            transcript_file,
            lang_code,
        } => {
            let job_id = client
                .restorations
                .restore(RestoreRequest {
                    audio_path: audio,
                    transcript: transcript(text, transcript_file),
                    lang_code,
                })
                .await?;
            println!("{job_id}");
            Ok(())
        }
        RestoreCommand::Status { job_id } => print_json(&client.restorations.get(&job_id).await?),
        RestoreCommand::List => print_json(&client.restorations.list().await?),
        RestoreCommand::Delete { job_id } => {
            report("deleted", client.restorations.delete(&job_id).await?)
        }
    }
}

fn report(action: &str, done: bool) -> anyhow::Result<()> {
    if done {
        println!("{action}");
        Ok(())
    } else {
        bail!("Nothing was {action}")
    }
}
