//! Chain head subscription feeding newly observed blocks to consumers.
use std::{sync::Arc, time::Duration};

use eyre::{Result, WrapErr};
use futures::StreamExt;
use primitives::block::Block;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{BeaconClient, node::HeadStream};

/// Capacity of the block delivery queue. The stream task waits when it is full.
pub const HEAD_CHANNEL_CAPACITY: usize = 1000;

/// Delay before re-opening a failed subscription.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Opens the head subscription and spawns the task that resolves each head
/// update to its blocks.
///
/// Failing to open the first subscription is an error. Once running, the task
/// re-opens the subscription whenever it fails and only stops after the
/// returned receiver is dropped.
pub async fn spawn_head_stream(
    client: Arc<BeaconClient>,
) -> Result<(mpsc::Receiver<Block>, JoinHandle<()>)> {
    let stream = client
        .node()
        .stream_chain_head()
        .await
        .wrap_err("error initializing chain head stream")?;
    let (tx, rx) = mpsc::channel(HEAD_CHANNEL_CAPACITY);
    let handle = tokio::spawn(run_head_stream(client, stream, tx));
    Ok((rx, handle))
}

async fn run_head_stream(client: Arc<BeaconClient>, mut stream: HeadStream, tx: mpsc::Sender<Block>) {
    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("Head stream receiver dropped, stopping");
                return;
            }
            next = stream.next() => next,
        };

        let head = match next {
            Some(Ok(head)) => head,
            Some(Err(err)) => {
                error!(err = %err, "Error receiving from chain head stream");
                stream = reconnect(&client).await;
                continue;
            }
            None => {
                warn!("Chain head stream ended");
                stream = reconnect(&client).await;
                continue;
            }
        };

        let blocks = match client.blocks_by_slot(head.head_slot).await {
            Ok(blocks) => blocks,
            Err(err) => {
                error!(slot = head.head_slot, err = %err, "Error receiving blocks via chain head stream");
                continue;
            }
        };

        for block in blocks {
            info!(slot = block.slot, root = %block.block_root, "Received block via chain head stream");
            if tx.send(block).await.is_err() {
                debug!("Head stream receiver dropped, stopping");
                return;
            }
        }
    }
}

async fn reconnect(client: &BeaconClient) -> HeadStream {
    loop {
        sleep(RECONNECT_DELAY).await;
        match client.node().stream_chain_head().await {
            Ok(stream) => return stream,
            Err(err) => {
                error!(err = %err, "Error initializing chain head stream, retrying in 1s");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy_primitives::B256;
    use chainio::SigningScheme;
    use eyre::eyre;
    use primitives::chain::ChainConfig;

    use crate::{
        testing::{FakeNode, FakeWithdrawals, container, head},
        wire::Phase0Body,
    };

    fn client(node: Arc<FakeNode>) -> Arc<BeaconClient> {
        Arc::new(BeaconClient::new(
            node,
            Arc::new(FakeWithdrawals::default()),
            ChainConfig::default(),
            SigningScheme::new(1),
            250,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_errors() {
        let node = Arc::new(FakeNode::default());
        node.add_block(container(100, B256::repeat_byte(1), Phase0Body::default()));
        node.add_block(container(101, B256::repeat_byte(2), Phase0Body::default()));
        node.push_stream(Ok(vec![Ok(head(100)), Err(eyre!("connection reset"))]));
        node.push_stream(Err(eyre!("connection refused")));
        node.push_stream(Ok(vec![Ok(head(101))]));

        let (mut rx, handle) = spawn_head_stream(client(Arc::clone(&node))).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().slot, 100);
        assert_eq!(rx.recv().await.unwrap().slot, 101);
        assert!(node.stream_opens() >= 3);

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn first_open_failure_is_an_error() {
        let node = Arc::new(FakeNode::default());
        node.push_stream(Err(eyre!("connection refused")));

        assert!(spawn_head_stream(client(node)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn heads_without_blocks_deliver_nothing() {
        let node = Arc::new(FakeNode::default());
        node.add_block(container(101, B256::repeat_byte(2), Phase0Body::default()));
        node.push_stream(Ok(vec![Ok(head(100)), Ok(head(101))]));

        let (mut rx, _handle) = spawn_head_stream(client(node)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().slot, 101);
    }
}
