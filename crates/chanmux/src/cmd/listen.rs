use chanmux_mux::{MuxListener, MuxSession};
use futures_util::stream::{select_all, StreamExt};

use crate::cmd::{finish, interrupted, Context, ListenArgs};
use crate::exit::{mux_error, CliResult, SUCCESS};
use crate::output::{print_message, print_stats};

pub async fn run(args: ListenArgs, ctx: &Context) -> CliResult<i32> {
    let listener = MuxListener::bind(&args.path, args.channels.specs())
        .map_err(|err| mux_error("bind failed", err))?
        .with_config(ctx.mux_config.clone());
    tracing::info!(
        path = %listener.path().display(),
        channels = %args.channels,
        "listening"
    );

    let shutdown = interrupted();
    tokio::pin!(shutdown);
    let mut printed = 0usize;

    loop {
        let session = tokio::select! {
            accepted = listener.accept() => accepted.map_err(|err| mux_error("accept failed", err))?,
            signal = &mut shutdown => {
                signal?;
                return Ok(SUCCESS);
            }
        };

        let MuxSession {
            peer_id,
            channels,
            handle,
            task,
        } = session;
        tracing::info!(peer_id = %peer_id, "peer connected");

        // Only the read halves are kept; dropping every sink shuts down
        // our write direction.
        let mut inbound = select_all(channels.into_iter().map(|channel| {
            let id = channel.id();
            let (_, stream) = channel.split();
            stream.map(move |item| (id, item))
        }));

        let mut stop = false;
        loop {
            tokio::select! {
                item = inbound.next() => match item {
                    Some((id, Ok(message))) => {
                        print_message(id, &message, &peer_id, ctx.format);
                        printed = printed.saturating_add(1);
                        if args.count.is_some_and(|count| printed >= count) {
                            stop = true;
                            break;
                        }
                    }
                    Some((id, Err(err))) => {
                        tracing::warn!(peer_id = %peer_id, channel = %id, error = %err, "dropping undecodable message");
                    }
                    None => break,
                },
                signal = &mut shutdown => {
                    signal?;
                    stop = true;
                    break;
                }
            }
        }

        if stop {
            handle.close();
        }
        drop(inbound);
        let stats = finish(task).await?;
        tracing::info!(peer_id = %peer_id, frames_in = stats.frames_in, "peer disconnected");
        if args.stats {
            print_stats(&stats, &peer_id, ctx.format);
        }
        if stop {
            return Ok(SUCCESS);
        }
    }
}
