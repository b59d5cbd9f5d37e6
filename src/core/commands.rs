//! Display commands for the glasses
//! Text pages, RSVP streams, notifications and the AI/microphone controls,
//! paced across both lenses.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::display_config::DisplayConfig;
use crate::core::bluetooth::link::Link;
use crate::core::bluetooth::manager::GlassesManager;
use crate::core::bluetooth::types::{AckOutcome, Side};
use crate::core::protocol::frames::{
    Frame, SubCommand, TextResult, AI_DISPLAYING, AI_DISPLAY_COMPLETE, MAX_TEXT_PAYLOAD, SCREEN_NEW_CONTENT,
};
use crate::core::protocol::notification::{build_notification_frames, NcsNotification};
use crate::core::protocol::rsvp::{build_groups, RsvpConfig};
use crate::core::protocol::text::{format_text_lines, paginate, split_packages};
use crate::error::{GlassesError, Result};

/// Placeholder shown when an RSVP stream ends
const CLEAR_TEXT: &str = "--";

/// Position of one page within a message
#[derive(Debug, Clone, Copy)]
struct PageHeader {
    seq: u8,
    page_number: u8,
    max_pages: u8,
    screen_status: u8,
}

/// TextResult frames for one page, split into packages that fit one write
fn page_frames(text: &str, header: PageHeader) -> Vec<Vec<u8>> {
    let packages = split_packages(text, MAX_TEXT_PAYLOAD);
    let total_packages = u8::try_from(packages.len()).unwrap_or(u8::MAX);

    packages
        .into_iter()
        .enumerate()
        .map(|(index, data)| {
            Frame::TextResult(TextResult {
                seq: header.seq,
                total_packages,
                current_package: u8::try_from(index).unwrap_or(u8::MAX),
                screen_status: header.screen_status,
                page_number: header.page_number,
                max_pages: header.max_pages,
                data,
                ..Default::default()
            })
            .to_bytes()
        })
        .collect()
}

/// Command executor for the glasses
pub struct CommandExecutor {
    manager: Arc<GlassesManager>,
    display: DisplayConfig,
}

impl CommandExecutor {
    pub fn new(manager: Arc<GlassesManager>, display: DisplayConfig) -> Self {
        Self { manager, display }
    }

    pub fn manager(&self) -> &Arc<GlassesManager> {
        &self.manager
    }

    pub fn display_config(&self) -> &DisplayConfig {
        &self.display
    }

    /// Send the page to the left lens, pause, then the right lens, pause again.
    async fn send_page(&self, left: &Link, right: &Link, frames: &[Vec<u8>]) -> bool {
        let mut delivered = true;
        for link in [left, right] {
            for frame in frames {
                delivered &= link.send(frame).await;
            }
            sleep(self.display.inter_link_delay()).await;
        }
        delivered
    }

    /// Wrap, paginate and show `message` on both lenses.
    ///
    /// Every page goes out as displaying; the last page is sent once more as
    /// complete. Returns the last page's text, or None when a lens is missing
    /// or a write was rejected.
    pub async fn send_text(&self, message: &str) -> Option<String> {
        let (left, right) = match self.manager.links().await {
            Ok(links) => links,
            Err(e) => {
                error!("Could not send text: {}", e);
                return None;
            }
        };

        let pages = paginate(&format_text_lines(message));
        let total_pages = pages.len();
        let max_pages = u8::try_from(total_pages).unwrap_or(u8::MAX);
        info!("Sending text as {} page(s)", total_pages);

        let mut last_page = String::new();
        for (index, page) in pages.iter().enumerate() {
            let page_number = index + 1;
            let mut header = PageHeader {
                seq: (index % 256) as u8,
                page_number: u8::try_from(page_number).unwrap_or(u8::MAX),
                max_pages,
                screen_status: SCREEN_NEW_CONTENT | AI_DISPLAYING,
            };

            if !self.send_page(&left, &right, &page_frames(page, header)).await {
                error!("Failed to display page {}/{}", page_number, total_pages);
                return None;
            }

            if page_number != 1 && total_pages != 1 {
                sleep(self.display.page_delay()).await;
            }

            if page_number == total_pages {
                header.screen_status = SCREEN_NEW_CONTENT | AI_DISPLAY_COMPLETE;
                if !self.send_page(&left, &right, &page_frames(page, header)).await {
                    error!("Failed to complete page {}/{}", page_number, total_pages);
                    return None;
                }
            }
            last_page.clone_from(page);
        }

        Some(last_page)
    }

    /// Show `text` a group of words at a time.
    ///
    /// Returns Ok(false) for empty input or a failed group, Ok(true) once
    /// every group was shown. When `cancel_token` fires the display is
    /// cleared and `GlassesError::Cancelled` is returned.
    pub async fn send_rsvp(
        &self,
        text: &str,
        config: &RsvpConfig,
        cancel_token: &CancellationToken,
    ) -> Result<bool> {
        config.validate()?;

        let groups = build_groups(text, config);
        if groups.is_empty() {
            warn!("Empty text provided");
            return Ok(false);
        }

        let delay = config.group_delay();
        info!("RSVP: {} groups, {:?} between groups", groups.len(), delay);

        let run = async {
            for group in &groups {
                // settling groups only wait
                if !group.is_empty() && self.send_text(group).await.is_none() {
                    error!("Failed to display group: {}", group);
                    return false;
                }
                sleep(delay).await;
            }
            true
        };

        tokio::select! {
            completed = run => {
                if !completed {
                    return Ok(false);
                }
                self.clear_display().await;
                Ok(true)
            }
            _ = cancel_token.cancelled() => {
                info!("RSVP display cancelled");
                self.clear_display().await;
                Err(GlassesError::Cancelled)
            }
        }
    }

    /// [`send_rsvp`](Self::send_rsvp) with the pacing from the display config
    pub async fn send_rsvp_configured(
        &self,
        text: &str,
        cancel_token: &CancellationToken,
    ) -> Result<bool> {
        self.send_rsvp(text, &self.display.rsvp, cancel_token).await
    }

    async fn clear_display(&self) {
        if self.send_text(CLEAR_TEXT).await.is_none() {
            warn!("Failed to clear the display");
        }
    }

    /// Send a notification to both lenses, chunk by chunk.
    ///
    /// Chunks are not acknowledged; the result only says whether every
    /// write was accepted.
    pub async fn send_notification(&self, notification: &NcsNotification) -> Result<bool> {
        let (left, right) = self.manager.links().await?;
        let frames = build_notification_frames(notification)?;
        info!("Sending notification {} in {} chunk(s)", notification.msg_id, frames.len());

        let mut delivered = true;
        for frame in &frames {
            let bytes = frame.to_bytes();
            delivered &= left.send(&bytes).await;
            delivered &= right.send(&bytes).await;
            debug!("Sent notification chunk of {} bytes", bytes.len());
            sleep(self.display.chunk_delay()).await;
        }

        if !delivered {
            warn!("Some notification chunks were not delivered");
        }
        Ok(delivered)
    }

    /// Send an Even AI control frame to both lenses
    pub async fn start_ai(&self, subcommand: SubCommand, param: &[u8]) -> Result<bool> {
        info!("Sending AI command: {}", subcommand.description());
        let frame = Frame::StartAi {
            subcommand,
            param: param.to_vec(),
        };
        self.manager.send_to_both(&frame.to_bytes()).await
    }

    pub async fn set_microphone(&self, enable: bool) -> Result<bool> {
        info!("Turning microphone {}", if enable { "on" } else { "off" });
        self.manager
            .send_to_both(&Frame::MicControl { enable }.to_bytes())
            .await
    }

    /// Wait for the next packet from `side` and check that it acknowledges
    pub async fn wait_for_ack(&self, side: Side) -> Result<AckOutcome> {
        let link = self
            .manager
            .link(side)
            .await
            .ok_or(GlassesError::MissingLink(side))?;
        Ok(link.wait_for_ack(self.display.ack_timeout()).await)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::glasses_config::GlassesConfig;
    use crate::core::bluetooth::mock::{MockBackend, MockTransport};
    use crate::core::bluetooth::types::DiscoveredDevice;
    use crate::core::protocol::frames::MAX_NOTIFICATION_CHUNK;

    const LEFT: &str = "AA:01";
    const RIGHT: &str = "AA:02";

    async fn connected() -> (CommandExecutor, Arc<MockBackend>) {
        let backend = MockBackend::new(vec![
            DiscoveredDevice::new("Even G1_7_L_X", LEFT),
            DiscoveredDevice::new("Even G1_7_R_X", RIGHT),
        ]);
        let manager = GlassesManager::new(backend.clone(), GlassesConfig::default())
            .await
            .unwrap();
        assert!(manager.scan_and_connect(Duration::from_secs(1)).await);
        (CommandExecutor::new(Arc::new(manager), DisplayConfig::default()), backend)
    }

    fn text_frames(transport: &MockTransport) -> Vec<Vec<u8>> {
        transport
            .payload_writes()
            .into_iter()
            .filter(|w| w[0] == 0x4E)
            .collect()
    }

    /// Text of the frames shown as "displaying", in order
    fn shown_texts(transport: &MockTransport) -> Vec<String> {
        text_frames(transport)
            .into_iter()
            .filter(|w| w[4] == 0x31)
            .map(|w| String::from_utf8_lossy(&w[9..]).trim().to_string())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_text_needs_both_links() {
        let backend = MockBackend::new(vec![DiscoveredDevice::new("G1_L_", LEFT)]);
        let manager = GlassesManager::new(backend.clone(), GlassesConfig::default())
            .await
            .unwrap();
        assert!(manager.scan_and_connect(Duration::from_secs(1)).await);
        let executor = CommandExecutor::new(Arc::new(manager), DisplayConfig::default());

        assert_eq!(executor.send_text("hello").await, None);
        assert!(text_frames(&backend.transport(LEFT)).is_empty());
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_is_centered_and_completed() {
        let (executor, backend) = connected().await;

        let shown = executor.send_text("Hello").await;
        assert_eq!(shown.as_deref(), Some("\n\nHello\n\n"));

        for address in [LEFT, RIGHT] {
            let frames = text_frames(&backend.transport(address));
            assert_eq!(frames.len(), 2);
            assert_eq!(&frames[0][..9], &[0x4E, 0, 1, 0, 0x31, 0, 0, 1, 1]);
            assert_eq!(&frames[1][..9], &[0x4E, 0, 1, 0, 0x41, 0, 0, 1, 1]);
            assert_eq!(&frames[0][9..], b"\n\nHello\n\n");
        }
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_page_order_and_pacing() {
        let (executor, backend) = connected().await;
        let lines: Vec<String> = (0..12).map(|i| format!("line {}", i)).collect();

        let started = tokio::time::Instant::now();
        let shown = executor.send_text(&lines.join("\n")).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(shown, "\nline 10\nline 11\n\n");
        // four page sends of two 400ms pauses, page delay after pages 2 and 3
        assert!(elapsed >= Duration::from_millis(13_200));
        assert!(elapsed < Duration::from_secs(14));

        let frames = text_frames(&backend.transport(RIGHT));
        let headers: Vec<(u8, u8, u8, u8)> = frames.iter().map(|f| (f[1], f[4], f[7], f[8])).collect();
        assert_eq!(
            headers,
            vec![(0, 0x31, 1, 3), (1, 0x31, 2, 3), (2, 0x31, 3, 3), (2, 0x41, 3, 3)]
        );
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_page_is_split_into_packages() {
        let (executor, backend) = connected().await;

        executor.send_text(&"a".repeat(200)).await.unwrap();

        let frames = text_frames(&backend.transport(LEFT));
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f.len() <= 180));
        assert_eq!((frames[0][2], frames[0][3]), (2, 0));
        assert_eq!((frames[1][2], frames[1][3]), (2, 1));
        assert_eq!(frames[0].len() - 9 + frames[1].len() - 9, 204);
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_write_fails_send_text() {
        let (executor, backend) = connected().await;
        backend.transport(RIGHT).fail_writes(true);

        assert_eq!(executor.send_text("Hello").await, None);
        // the failed page is not completed
        assert_eq!(text_frames(&backend.transport(LEFT)).len(), 1);
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rsvp_shows_groups_then_clears() {
        let (executor, backend) = connected().await;
        let config = RsvpConfig::new(2, 250, "...").unwrap();

        let done = executor
            .send_rsvp("one two three", &config, &CancellationToken::new())
            .await
            .unwrap();

        assert!(done);
        assert_eq!(
            shown_texts(&backend.transport(LEFT)),
            vec!["one two", "three ...", "--"]
        );
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rsvp_uses_configured_grouping() {
        let (executor, backend) = connected().await;
        let display = DisplayConfig {
            rsvp: RsvpConfig::new(3, 250, "_").unwrap(),
            ..Default::default()
        };
        let executor = CommandExecutor::new(executor.manager().clone(), display);

        let done = executor
            .send_rsvp_configured("a b c d", &CancellationToken::new())
            .await
            .unwrap();

        assert!(done);
        assert_eq!(
            shown_texts(&backend.transport(RIGHT)),
            vec!["a b c", "d _ _", "--"]
        );
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rsvp_empty_text() {
        let (executor, backend) = connected().await;

        let done = executor
            .send_rsvp("   ", &RsvpConfig::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!done);
        assert!(text_frames(&backend.transport(LEFT)).is_empty());
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rsvp_cancellation_clears_and_reports() {
        let (executor, backend) = connected().await;
        let token = CancellationToken::new();

        let cancel = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let result = executor
            .send_rsvp("a b c d e f g h", &RsvpConfig::default(), &token)
            .await;

        assert!(matches!(result, Err(GlassesError::Cancelled)));
        let shown = shown_texts(&backend.transport(RIGHT));
        assert_eq!(shown.last().map(String::as_str), Some("--"));
        assert!(!shown.contains(&"h".to_string()));
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_chunks_reach_both_lenses() {
        let (executor, backend) = connected().await;
        let notification = NcsNotification::new(
            7,
            "com.even.test",
            "Title",
            "Subtitle",
            "x".repeat(300),
            "Even",
        );

        assert!(executor.send_notification(&notification).await.unwrap());

        for address in [LEFT, RIGHT] {
            let chunks: Vec<Vec<u8>> = backend
                .transport(address)
                .payload_writes()
                .into_iter()
                .filter(|w| w[0] == 0x4B)
                .collect();
            assert!(chunks.len() >= 2);
            for (index, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk[1], 0);
                assert_eq!(usize::from(chunk[2]), chunks.len());
                assert_eq!(usize::from(chunk[3]), index);
                assert!(chunk.len() - 4 <= MAX_NOTIFICATION_CHUNK);
            }
            let json: Vec<u8> = chunks.iter().flat_map(|c| c[4..].to_vec()).collect();
            let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
            assert_eq!(value["ncs_notification"]["msg_id"], 7);
        }
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ai_and_microphone_frames() {
        let (executor, backend) = connected().await;

        assert!(executor.start_ai(SubCommand::Start, &[]).await.unwrap());
        assert!(executor.set_microphone(true).await.unwrap());

        for address in [LEFT, RIGHT] {
            assert_eq!(
                backend.transport(address).payload_writes(),
                vec![vec![0xF5, 0x17], vec![0x0E, 0x01]]
            );
        }
        executor.manager().shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ack_on_side() {
        let (executor, backend) = connected().await;

        backend.transport(LEFT).push_notification(vec![0xC9, 0x00]).await;
        assert_eq!(
            executor.wait_for_ack(Side::Left).await.unwrap(),
            AckOutcome::Acknowledged
        );
        assert_eq!(
            executor.wait_for_ack(Side::Right).await.unwrap(),
            AckOutcome::TimedOut
        );
        executor.manager().shutdown().await;
    }
}
