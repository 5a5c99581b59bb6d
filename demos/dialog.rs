use std::time::Duration;
use tokio_channels::context::{self, EventLoop};
use tokio_channels::{DispatchPolicy, Error, EventBus};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct DialogClosed {
    title: String,
    accepted: bool,
}

#[derive(Debug, Clone)]
struct Progress(u8);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("Testing tokio-channels...\n");

    let bus = EventBus::builder().build()?;
    let dialogs = bus.channel::<DialogClosed>();

    // Inline: runs before publish returns
    let audit = dialogs.subscribe(
        |event| {
            println!("[inline] '{}' closed, accepted = {}", event.title, event.accepted);
            Ok(())
        },
        DispatchPolicy::PublishThread,
    );

    // Background: the publisher does not wait
    let background = dialogs.subscribe(
        |event| {
            println!("[worker] saving result of '{}'", event.title);
            Ok(())
        },
        DispatchPolicy::NewTask,
    );

    // Caller context: a "UI thread" with its own event loop
    let mut ui_loop = EventLoop::new();
    let ui_handle = ui_loop.handle();
    let ui_thread = {
        let dialogs = dialogs.clone();
        std::thread::spawn(move || {
            let _guard = context::enter(ui_loop.executor());
            let token = dialogs.subscribe_on(
                "settings",
                |event| {
                    println!("[ui] settings dialog closed, accepted = {}", event.accepted);
                    Ok(())
                },
                DispatchPolicy::CallerContext,
            );
            ui_loop.run();
            token.unsubscribe();
        })
    };

    // Give the UI thread time to subscribe
    tokio::time::sleep(Duration::from_millis(50)).await;

    println!("Publishing events...");
    dialogs.publish(DialogClosed {
        title: "About".into(),
        accepted: true,
    })?;
    dialogs.publish_on(
        "settings",
        DialogClosed {
            title: "Settings".into(),
            accepted: false,
        },
    )?;

    // Async channel: slow and fast handlers, awaited newest first
    let progress = bus.async_channel::<Progress>();
    let slow = progress.subscribe(
        |event: Progress| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            println!("[async] slow handler saw {}%", event.0);
            Ok(())
        },
        DispatchPolicy::PublishThread,
    );
    let fast = progress.subscribe(
        |event: Progress| async move {
            println!("[async] fast handler saw {}%", event.0);
            Ok(())
        },
        DispatchPolicy::PublishThread,
    );
    progress.publish(Progress(50)).await?;

    // A failing inline handler surfaces to the publisher
    let strict = progress.subscribe(
        |event: Progress| async move {
            if event.0 > 100 {
                Err(Error::handler("progress above 100%"))
            } else {
                Ok(())
            }
        },
        DispatchPolicy::PublishThread,
    );
    if let Err(e) = progress.publish(Progress(120)).await {
        println!("publish failed: {e}");
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("\n{}", dialogs.stats());
    println!("{}", progress.stats());
    println!("{:?}", bus.stats());

    // Clean up
    ui_handle.quit()?;
    ui_thread
        .join()
        .map_err(|_| Error::internal("ui thread panicked"))?;
    audit.unsubscribe();
    background.unsubscribe();
    for token in [slow, fast, strict] {
        token.unsubscribe();
    }

    Ok(())
}
