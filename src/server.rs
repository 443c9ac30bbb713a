//! Accepts websocket connections and spawns one async task per client, bridging the tagged
//! JSON control channel and the binary camera-frame channel into a [`Session`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::decode::ImageDecoder;
use crate::flow::OpticalFlowEngine;
use crate::motion::vision::{VisionConfig, VisionTracker};
use crate::protocol::{parse_client_msg, ServerMsg};
use crate::session::Session;
use crate::sink::InputSink;

pub struct ServerHandle {
    pub local_addr: SocketAddr,
}

pub async fn serve(
    bind: SocketAddr,
    sink: Arc<dyn InputSink>,
    decoder: Arc<dyn ImageDecoder>,
    flow_engine: Arc<dyn OpticalFlowEngine>,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<ServerHandle> {
    let listener = TcpListener::bind(bind).await.with_context(|| format!("binding to {bind}"))?;
    let local_addr = listener.local_addr()?;
    info!("listening on {local_addr}");

    tokio::spawn(accept_loop(listener, sink, decoder, flow_engine, shutdown));
    Ok(ServerHandle { local_addr })
}

async fn accept_loop(
    listener: TcpListener,
    sink: Arc<dyn InputSink>,
    decoder: Arc<dyn ImageDecoder>,
    flow_engine: Arc<dyn OpticalFlowEngine>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!("accept failed: {err:#}");
                        continue;
                    }
                };
                let sink = Arc::clone(&sink);
                let decoder = Arc::clone(&decoder);
                let flow_engine = Arc::clone(&flow_engine);
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, peer, sink, decoder, flow_engine).await {
                        warn!("session with {peer} ended: {err:#}");
                    }
                });
            }
            _ = shutdown.changed() => {
                info!("shutting down accept loop");
                return;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    sink: Arc<dyn InputSink>,
    decoder: Arc<dyn ImageDecoder>,
    flow_engine: Arc<dyn OpticalFlowEngine>,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await.context("websocket handshake failed")?;
    info!("client connected from {peer}");

    struct EngineAdapter(Arc<dyn OpticalFlowEngine>);
    impl OpticalFlowEngine for EngineAdapter {
        fn track(&self, prev: &crate::decode::GrayFrame, curr: &crate::decode::GrayFrame, points: &[crate::flow::Point2]) -> Vec<crate::flow::TrackResult> {
            self.0.track(prev, curr, points)
        }
        fn detect_features(&self, frame: &crate::decode::GrayFrame, max_corners: usize, quality_level: f64, min_distance: f64) -> Vec<crate::flow::Point2> {
            self.0.detect_features(frame, max_corners, quality_level, min_distance)
        }
    }

    let vision = VisionTracker::new(VisionConfig::default(), Box::new(EngineAdapter(flow_engine)));
    let session = Session::new(sink, decoder, vision);
    session.start();

    let (mut write, mut read) = ws.split();

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(err) => {
                warn!("websocket error from {peer}: {err:#}");
                break;
            }
        };

        match msg {
            Message::Text(text) => match parse_client_msg(&text) {
                Ok(client_msg) => {
                    if let Some(ack) = session.handle_text(client_msg) {
                        let _ = write.send(Message::Text(crate::protocol::encode_server_msg(&ack))).await;
                    }
                }
                Err(err) => {
                    warn!("malformed message from {peer}: {err}");
                    let err_msg = ServerMsg::Error { message: err.to_string() };
                    let _ = write.send(Message::Text(crate::protocol::encode_server_msg(&err_msg))).await;
                }
            },
            Message::Binary(bytes) => {
                session.handle_binary(&bytes);
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    session.stop();
    info!("client {peer} disconnected");
    Ok(())
}
