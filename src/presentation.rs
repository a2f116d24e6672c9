//! Presentation layer.
//!
//! [`Booth`] is the one interface front ends use. It never returns an
//! error: every exit state becomes a [`RenderableResult`] with its own
//! user-visible message. Theme strings come from `[presentation]`.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PresentationConfig;
use crate::oracle::{Fortune, FortuneError, FortuneService};
use crate::roster::resolver::InputError;

/// Shown when the identifier is blank.
pub const EMPTY_INPUT_MESSAGE: &str = "⚠️ Vui lòng nhập MSNV hoặc họ tên!";
/// Shown when the identifier is malformed.
pub const INVALID_IDENTIFIER_MESSAGE: &str = "❌ Nhập MSNV hoặc tên hợp lệ!";
/// Shown when the fortune number is malformed.
pub const INVALID_NUMBER_MESSAGE: &str = "❌ Số may mắn phải là một số nguyên dương!";
/// Shown when no participant matches.
pub const NOT_FOUND_MESSAGE: &str = "❌ Không tìm thấy người này!";
/// Shown after a successful refresh.
pub const REFRESHED_MESSAGE: &str = "✅ Dữ liệu đã được tải lại!";
/// Leads the notice when a refresh cleared the cache but the reload failed.
pub const REFRESH_FAILED_MESSAGE: &str = "⚠️ Đã xoá dữ liệu cũ nhưng tải lại thất bại";
/// Heading used when the record has no name.
pub const DEFAULT_HEADING: &str = "Bạn";
/// Team line used when the record has no team.
pub const GUEST_LABEL: &str = "Khách mời";

/// Category of a non-fortune result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Blank identifier.
    EmptyInput,
    /// Malformed identifier or fortune number.
    InvalidInput,
    /// No participant matches.
    NotFound,
    /// The workbook could not be fetched.
    FetchFailed,
    /// The model call failed.
    GenerationFailed,
    /// Cached data was dropped and reloaded.
    Refreshed,
}

impl NoticeKind {
    /// Whether the notice reports a failure.
    pub fn is_error(self) -> bool {
        !matches!(self, Self::Refreshed)
    }
}

/// A fortune ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FortuneCard {
    /// Participant name or [`DEFAULT_HEADING`].
    pub heading: String,
    /// Team line or [`GUEST_LABEL`].
    pub team_line: String,
    /// Fortune text.
    pub body: String,
}

impl From<Fortune> for FortuneCard {
    fn from(fortune: Fortune) -> Self {
        Self {
            heading: fortune
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_HEADING.to_owned()),
            team_line: fortune.team.map_or_else(
                || GUEST_LABEL.to_owned(),
                |team| format!("🏢 Nhóm: {team}"),
            ),
            body: fortune.text,
        }
    }
}

/// What the front end shows after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderableResult {
    /// A told fortune.
    Fortune(FortuneCard),
    /// A status or failure message.
    Notice {
        /// Which exit state this is.
        kind: NoticeKind,
        /// User-visible message.
        message: String,
    },
}

impl RenderableResult {
    fn notice(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self::Notice {
            kind,
            message: message.into(),
        }
    }
}

/// Map a pipeline failure to its user-visible notice.
pub fn notice_for(error: &FortuneError) -> RenderableResult {
    match error {
        FortuneError::Input(InputError::Empty) => {
            RenderableResult::notice(NoticeKind::EmptyInput, EMPTY_INPUT_MESSAGE)
        }
        FortuneError::Input(InputError::IdOutOfRange(_)) => {
            RenderableResult::notice(NoticeKind::InvalidInput, INVALID_IDENTIFIER_MESSAGE)
        }
        FortuneError::Input(InputError::FortuneNumber(_)) => {
            RenderableResult::notice(NoticeKind::InvalidInput, INVALID_NUMBER_MESSAGE)
        }
        FortuneError::NotFound(_) => RenderableResult::notice(NoticeKind::NotFound, NOT_FOUND_MESSAGE),
        FortuneError::Source(e) => RenderableResult::notice(
            NoticeKind::FetchFailed,
            format!("❌ Lỗi khi lấy dữ liệu: {e}"),
        ),
        FortuneError::Record(e) => RenderableResult::notice(
            NoticeKind::GenerationFailed,
            format!("❌ Có lỗi xảy ra: {e}"),
        ),
        FortuneError::Generation(e) => RenderableResult::notice(
            NoticeKind::GenerationFailed,
            format!("❌ Có lỗi xảy ra: {e}"),
        ),
    }
}

/// The booth: submit and refresh actions over a [`FortuneService`].
#[derive(Debug, Clone)]
pub struct Booth {
    service: Arc<FortuneService>,
    theme: PresentationConfig,
}

impl Booth {
    /// Create a booth.
    pub fn new(service: Arc<FortuneService>, theme: PresentationConfig) -> Self {
        Self { service, theme }
    }

    /// Theme strings.
    pub fn theme(&self) -> &PresentationConfig {
        &self.theme
    }

    /// Tell a fortune for the raw inputs.
    pub async fn submit(&self, identifier: &str, fortune_number: Option<&str>) -> RenderableResult {
        match self.service.tell(identifier, fortune_number).await {
            Ok(fortune) => RenderableResult::Fortune(fortune.into()),
            Err(e) => {
                warn!(error = %e, "fortune request failed");
                notice_for(&e)
            }
        }
    }

    /// Drop cached data and load it again.
    pub async fn refresh(&self) -> RenderableResult {
        let generation = self.service.refresh().await;
        match self.service.cache().get().await {
            Ok(snapshot) => {
                info!(
                    generation,
                    participants = snapshot.workbook.participants.len(),
                    "refresh complete"
                );
                RenderableResult::notice(NoticeKind::Refreshed, REFRESHED_MESSAGE)
            }
            Err(e) => {
                warn!(error = %e, generation, "cache cleared but reload failed");
                RenderableResult::notice(
                    NoticeKind::FetchFailed,
                    format!("{REFRESH_FAILED_MESSAGE}: {e}"),
                )
            }
        }
    }

    /// Title block printed when the booth opens.
    pub fn header(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.theme.banner);
        let _ = writeln!(out, "{}", self.theme.title);
        let _ = writeln!(out, "{}", self.theme.subtitle);
        let _ = writeln!(out, "{}", self.theme.banner);
        out
    }

    /// Terminal rendering of a result.
    pub fn render(&self, result: &RenderableResult) -> String {
        let mut out = String::new();
        match result {
            RenderableResult::Fortune(card) => {
                let _ = writeln!(out);
                let _ = writeln!(out, "✨ {} ✨", card.heading);
                let _ = writeln!(out, "{}", card.team_line);
                let _ = writeln!(out, "────────────────────────────────");
                let _ = writeln!(out, "🔮 Lời bói của bạn:");
                let _ = writeln!(out, "{}", card.body.trim_end());
                let _ = writeln!(out);
                let _ = writeln!(out, "{}", self.theme.footer);
            }
            RenderableResult::Notice { message, .. } => {
                let _ = writeln!(out, "{message}");
            }
        }
        out
    }
}
