//! Prompt assembly.
//!
//! Pure template filling: the composer never talks to a model. Product
//! wording is Vietnamese; Japanese guests get an English reply.

use crate::config::PromptConfig;
use crate::roster::resolver::Resolution;
use crate::roster::{Workbook, NATIONALITY_COLUMN};

const COMPANY_CONTEXT_INTRO: &str = "Hãy sử dụng bối cảnh công ty sau đây để hiểu về văn hóa và môi trường làm việc của công ty: ";
const ROLE_GLOSSARY_INTRO: &str = "Hãy sử dụng định nghĩa vai trò sau đây để hiểu về các vị trí công việc trong công ty: ";
const DEFAULT_PARTICIPANT_INTRO: &str = "Đây là thông tin cá nhân của người dùng:";
const ENGLISH_PARTICIPANT_INTRO: &str = "Vì đây là người Nhật, hãy trả lời bằng tiếng Anh một cách tự nhiên và thân thiện dựa vào thông tin của họ:";
/// Instruction preceding the text a fortune must contain.
pub const INJECTION_INSTRUCTION: &str = "Hãy đảm bảo câu bói của bạn có chứa thông tin sau đây:";
const CLOSING_REQUEST: &str = "Hãy tạo một câu bói vui nhộn và may mắn cho người này!";

/// Language the fortune is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLanguage {
    /// Default for everyone but the secondary-language nationality.
    Vietnamese,
    /// For the secondary-language nationality.
    English,
}

impl ResponseLanguage {
    /// Pick the language for a nationality value.
    ///
    /// Comparison is trimmed and ASCII case-insensitive; a missing
    /// nationality falls back to Vietnamese.
    pub fn for_nationality(nationality: Option<&str>, secondary: &str) -> Self {
        match nationality {
            Some(n) if n.trim().eq_ignore_ascii_case(secondary.trim()) => Self::English,
            _ => Self::Vietnamese,
        }
    }

    /// Language name as written in the system instruction.
    pub fn label(self) -> &'static str {
        match self {
            Self::Vietnamese => "Tiếng Việt",
            Self::English => "Tiếng Anh",
        }
    }

    fn participant_intro(self) -> &'static str {
        match self {
            Self::Vietnamese => DEFAULT_PARTICIPANT_INTRO,
            Self::English => ENGLISH_PARTICIPANT_INTRO,
        }
    }
}

/// System instruction plus ordered user-message segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    /// Reply language chosen from the participant's nationality.
    pub language: ResponseLanguage,
    /// Persona and output constraints.
    pub system: String,
    /// User-message text parts, in order.
    pub segments: Vec<String>,
}

/// Build the prompt for one participant.
///
/// Segment order: company-context intro, company context, role-glossary
/// intro, role definitions, participant intro, participant JSON, then the
/// injection instruction and injected text (each its own segment, only when
/// the injected text is non-blank), the fortune-number clause when a number
/// was given, and the closing request.
///
/// # Errors
///
/// Returns an error if the participant record cannot be serialised.
pub fn compose(
    resolution: &Resolution,
    workbook: &Workbook,
    settings: &PromptConfig,
    fortune_number: Option<u32>,
) -> Result<PromptPayload, serde_json::Error> {
    let nationality = resolution.record.text(NATIONALITY_COLUMN);
    let language = ResponseLanguage::for_nationality(
        nationality.as_deref(),
        &settings.secondary_language_nationality,
    );

    let mut segments = vec![
        COMPANY_CONTEXT_INTRO.to_owned(),
        workbook.company_context.clone(),
        ROLE_GLOSSARY_INTRO.to_owned(),
        workbook.role_definitions.clone(),
        language.participant_intro().to_owned(),
        resolution.record.to_json()?,
    ];

    if let Some(text) = resolution
        .text_to_inject
        .as_deref()
        .filter(|t| !t.trim().is_empty())
    {
        segments.push(INJECTION_INSTRUCTION.to_owned());
        segments.push(text.to_owned());
    }

    if let Some(number) = fortune_number {
        segments.push(fortune_number_clause(number));
    }

    segments.push(CLOSING_REQUEST.to_owned());

    Ok(PromptPayload {
        language,
        system: system_instruction(settings, language),
        segments,
    })
}

/// Clause folding the user's chosen number into the fortune.
pub fn fortune_number_clause(number: u32) -> String {
    format!("Số may mắn mà người này đã chọn là {number}. Hãy lồng ghép con số này vào câu bói một cách thú vị.")
}

fn system_instruction(settings: &PromptConfig, language: ResponseLanguage) -> String {
    let current_year = settings.target_year.saturating_sub(1);
    format!(
        "Bạn là một chatbot bói toán hài hước, thông minh, nói chuyện lưu loát dùng để giải trí trong buổi tiệc tất niên của công ty.
PHẢI LUÔN NHỚ RẰNG NĂM NAY LÀ NĂM {current_year} (NĂM SAU LÀ NĂM {target}, NĂM {label}).
Bạn sẽ dựa vào thông tin cá nhân của người dùng để đưa ra câu bói ngắn gọn, dễ hiểu, hài hước và thú vị.
Hãy chắc chắn rằng câu bói của bạn liên quan trực tiếp đến thông tin cá nhân của người dùng.
Hãy sử dụng ngôn ngữ tự nhiên, thân thiện và gần gũi, xưng hô \"Tôi\" và \"Bạn\".
Hãy thêm vài icon lung linh vào câu bói để tăng độ hấp dẫn, hoặc icon liên quan đến nội dung câu bói.
Hãy tránh sử dụng các cụm từ quá trang trọng hoặc kỹ thuật.
Hãy giữ câu bói không dài quá {max_words} từ.
Hãy trả lời bằng {language}.",
        target = settings.target_year,
        label = settings.year_label.to_uppercase(),
        max_words = settings.max_words,
        language = language.label(),
    )
}
