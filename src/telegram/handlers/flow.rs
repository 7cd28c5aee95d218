//! Conversation flow: upload, context questions, processing, report,
//! follow-ups, and comparison. Every entry point here runs with the
//! caller holding the per-user lock, so session reads and writes for one
//! user never interleave.

use chrono::Utc;
use teloxide::prelude::*;

use crate::core::config;
use crate::core::error::AppError;
use crate::core::subscription;
use crate::extract::{download_telegram_file, SupportedFileKind};
use crate::llm::StructuredRecord;
use crate::session::context::ContextField;
use crate::session::{Session, SessionState};
use crate::storage::db;
use crate::storage::get_connection;
use crate::telegram::handlers::types::{HandlerDeps, HandlerError};
use crate::telegram::sending::send_chunked;
use crate::telegram::{menu, texts, Bot};

/// Question text for a context field.
fn question_text(field: ContextField) -> &'static str {
    match field {
        ContextField::Age => texts::questions::AGE,
        ContextField::Sex => texts::questions::SEX,
        ContextField::Symptoms => texts::questions::SYMPTOMS,
        ContextField::ChronicConditions => texts::questions::CHRONIC,
        ContextField::Medications => texts::questions::MEDICATIONS,
        ContextField::Pregnancy => texts::questions::PREGNANCY,
    }
}

/// Ask the next unanswered question or run processing when the
/// questionnaire is complete.
async fn advance_questionnaire(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    session: &mut Session,
) -> Result<(), HandlerError> {
    match session.context.next_field() {
        Some(field) => {
            session.state = SessionState::AwaitingContext(session.context.next_index());
            deps.sessions.save(chat_id.0, session).await?;
            bot.send_message(chat_id, question_text(field)).await?;
        }
        None => {
            session.state = SessionState::Processing;
            deps.sessions.save(chat_id.0, session).await?;
            bot.send_message(chat_id, texts::PROCESSING).await?;
            process_analysis(bot, chat_id, deps, session).await?;
        }
    }
    Ok(())
}

/// Start a new analysis: move the session to AwaitingUpload.
pub async fn start_new_analysis(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let mut session = deps.sessions.load(chat_id.0).await?;
    session.reset();
    session.state = SessionState::AwaitingUpload;
    deps.sessions.save(chat_id.0, &session).await?;
    bot.send_message(chat_id, texts::UPLOAD_PROMPT).await?;
    Ok(())
}

/// Handle an incoming document or photo.
pub async fn handle_upload(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    let mut session = deps.sessions.load(chat_id.0).await?;

    if session.state != SessionState::AwaitingUpload {
        bot.send_message(chat_id, texts::NOT_IN_UPLOAD_STATE).await?;
        return Ok(());
    }

    // Resolve file id + kind; anything unrecognized re-prompts in place
    let (file_id, kind) = if let Some(doc) = msg.document() {
        let mime = doc.mime_type.as_ref().map(|m| m.essence_str().to_string()).unwrap_or_default();
        match SupportedFileKind::from_mime(&mime) {
            Some(kind) => (doc.file.id.clone(), kind),
            None => {
                bot.send_message(chat_id, texts::UNSUPPORTED_FILE).await?;
                return Ok(());
            }
        }
    } else if let Some(photos) = msg.photo() {
        match photos.last() {
            Some(photo) => (photo.file.id.clone(), SupportedFileKind::Jpeg),
            None => {
                bot.send_message(chat_id, texts::UNSUPPORTED_FILE).await?;
                return Ok(());
            }
        }
    } else {
        bot.send_message(chat_id, texts::UNSUPPORTED_FILE).await?;
        return Ok(());
    };

    let file = bot.get_file(file_id).await?;
    let bytes = match download_telegram_file(&config::BOT_TOKEN, &file.path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("File download failed for user {}: {}", chat_id.0, e);
            bot.send_message(chat_id, texts::EXTRACTION_FAILED).await?;
            return Ok(());
        }
    };

    match deps.extractor.extract(&bytes, kind).await {
        Ok(text) => {
            log::info!("📄 Extracted {} chars for user {}", text.chars().count(), chat_id.0);
            session.extracted_text = Some(text);
            bot.send_message(chat_id, texts::EXTRACTION_OK).await?;
            advance_questionnaire(bot, chat_id, deps, &mut session).await?;
        }
        Err(AppError::Extraction(reason)) => {
            log::warn!("Extraction failed for user {}: {}", chat_id.0, reason);
            bot.send_message(chat_id, texts::EXTRACTION_FAILED).await?;
            // Session stays in AwaitingUpload
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Route a plain text message according to the session state.
pub async fn handle_text(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    let text = msg.text().unwrap_or_default();
    let mut session = deps.sessions.load(chat_id.0).await?;

    match session.state {
        SessionState::AwaitingContext(_) => {
            let Some(field) = session.context.next_field() else {
                // Answers already complete; resume processing
                return advance_questionnaire(bot, chat_id, deps, &mut session).await;
            };
            match session.context.apply_answer(field, text) {
                Ok(()) => advance_questionnaire(bot, chat_id, deps, &mut session).await?,
                Err(reason) => {
                    bot.send_message(chat_id, reason).await?;
                }
            }
        }
        SessionState::AwaitingFollowUp => {
            answer_follow_up(bot, chat_id, deps, &mut session, text).await?;
        }
        SessionState::AwaitingConsent => {
            bot.send_message(chat_id, texts::CONSENT_PROMPT)
                .reply_markup(menu::consent_keyboard())
                .await?;
        }
        SessionState::AwaitingUpload => {
            bot.send_message(chat_id, texts::UPLOAD_PROMPT).await?;
        }
        SessionState::Processing => {
            bot.send_message(chat_id, texts::PROCESSING).await?;
        }
        SessionState::Idle | SessionState::ReportReady => {
            bot.send_message(chat_id, texts::MAIN_MENU)
                .reply_markup(menu::main_menu_keyboard())
                .await?;
        }
    }
    Ok(())
}

/// Reserve a quota unit, structure the document, persist, present.
///
/// The reservation happens before the LLM call and is released if
/// structuring fails, so a failed analysis never burns a paid unit.
async fn process_analysis(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, session: &mut Session) -> Result<(), HandlerError> {
    let user_id = chat_id.0;

    let reserved = {
        let conn = get_connection(&deps.db_pool)?;
        db::reserve_request(&conn, user_id, Utc::now())?
    };

    if !reserved {
        log::info!("🔒 Quota denied for user {}", user_id);
        session.reset();
        deps.sessions.save(user_id, session).await?;
        bot.send_message(chat_id, texts::PAYWALL)
            .reply_markup(menu::plans_keyboard())
            .await?;
        return Ok(());
    }

    let extracted = session.extracted_text.clone().unwrap_or_default();

    let structured = match deps.llm.structure(&extracted, &session.context).await {
        Ok(record) => record,
        Err(e) => {
            log::warn!("Structuring failed for user {}, releasing quota unit: {}", user_id, e);
            {
                let conn = get_connection(&deps.db_pool)?;
                db::release_request(&conn, user_id)?;
            }
            session.reset();
            deps.sessions.save(user_id, session).await?;
            bot.send_message(chat_id, texts::STRUCTURING_FAILED).await?;
            return Ok(());
        }
    };

    let report = match deps.llm.report(&structured, &session.context).await {
        Ok(report) => report,
        Err(e) => {
            log::warn!("Report generation failed for user {}, releasing quota unit: {}", user_id, e);
            {
                let conn = get_connection(&deps.db_pool)?;
                db::release_request(&conn, user_id)?;
            }
            session.reset();
            deps.sessions.save(user_id, session).await?;
            bot.send_message(chat_id, texts::STRUCTURING_FAILED).await?;
            return Ok(());
        }
    };

    let analysis_id = {
        let conn = get_connection(&deps.db_pool)?;
        db::insert_analysis(&conn, user_id, &structured.to_json()?, &report)?
    };
    log::info!("✅ Analysis {} stored for user {}", analysis_id, user_id);

    session.state = SessionState::ReportReady;
    session.current_analysis_id = Some(analysis_id);
    session.extracted_text = None;
    deps.sessions.save(user_id, session).await?;

    let full = format!("{}\n\n{}", report, texts::REPORT_FOOTER);
    send_chunked(bot, chat_id, &full, Some(menu::report_keyboard(config::limits::MAX_FOLLOW_UPS))).await?;
    Ok(())
}

/// Answer one follow-up question against the current analysis.
async fn answer_follow_up(
    bot: &Bot,
    chat_id: ChatId,
    deps: &HandlerDeps,
    session: &mut Session,
    question: &str,
) -> Result<(), HandlerError> {
    let user_id = chat_id.0;
    let Some(analysis_id) = session.current_analysis_id else {
        session.reset();
        deps.sessions.save(user_id, session).await?;
        bot.send_message(chat_id, texts::NO_ANALYSES).await?;
        return Ok(());
    };

    let question = question.trim();
    if question.is_empty() {
        bot.send_message(chat_id, texts::FOLLOW_UP_PROMPT).await?;
        return Ok(());
    }

    let (record, asked) = {
        let conn = get_connection(&deps.db_pool)?;
        let Some(analysis) = db::get_analysis(&conn, analysis_id, user_id)? else {
            session.reset();
            deps.sessions.save(user_id, session).await?;
            bot.send_message(chat_id, texts::NO_ANALYSES).await?;
            return Ok(());
        };
        (StructuredRecord::from_json(&analysis.structured_json)?, db::count_follow_ups(&conn, analysis_id)?)
    };

    if asked >= config::limits::MAX_FOLLOW_UPS {
        session.state = SessionState::ReportReady;
        deps.sessions.save(user_id, session).await?;
        bot.send_message(chat_id, texts::FOLLOW_UP_LIMIT).await?;
        return Ok(());
    }

    let answer = match deps.llm.answer_follow_up(&record, question).await {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("Follow-up failed for user {}: {}", user_id, e);
            bot.send_message(chat_id, texts::STRUCTURING_FAILED).await?;
            return Ok(());
        }
    };

    let remaining = {
        let conn = get_connection(&deps.db_pool)?;
        // The INSERT itself enforces the cap; a lost race here just means
        // the limit message instead of a stored answer
        if !db::insert_follow_up(&conn, analysis_id, question, &answer)? {
            session.state = SessionState::ReportReady;
            deps.sessions.save(user_id, session).await?;
            bot.send_message(chat_id, texts::FOLLOW_UP_LIMIT).await?;
            return Ok(());
        }
        config::limits::MAX_FOLLOW_UPS - db::count_follow_ups(&conn, analysis_id)?
    };

    session.state = SessionState::ReportReady;
    deps.sessions.save(user_id, session).await?;
    send_chunked(bot, chat_id, &answer, Some(menu::report_keyboard(remaining))).await?;
    Ok(())
}

/// Move the session into AwaitingFollowUp (button under the report).
pub async fn prompt_follow_up(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let mut session = deps.sessions.load(chat_id.0).await?;
    let Some(analysis_id) = session.current_analysis_id else {
        bot.send_message(chat_id, texts::NO_ANALYSES).await?;
        return Ok(());
    };

    let asked = {
        let conn = get_connection(&deps.db_pool)?;
        db::count_follow_ups(&conn, analysis_id)?
    };
    if asked >= config::limits::MAX_FOLLOW_UPS {
        bot.send_message(chat_id, texts::FOLLOW_UP_LIMIT).await?;
        return Ok(());
    }

    session.state = SessionState::AwaitingFollowUp;
    deps.sessions.save(chat_id.0, &session).await?;
    bot.send_message(chat_id, texts::FOLLOW_UP_PROMPT).await?;
    Ok(())
}

/// Compare the user's recent analyses (up to three, oldest first).
pub async fn run_compare(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = chat_id.0;
    let analyses = {
        let conn = get_connection(&deps.db_pool)?;
        db::get_recent_analyses(&conn, user_id, config::limits::MAX_COMPARE_WITH as i64 + 1)?
    };

    if analyses.len() < 2 {
        bot.send_message(chat_id, texts::COMPARE_NOT_ENOUGH).await?;
        return Ok(());
    }

    let mut records = Vec::with_capacity(analyses.len());
    for analysis in analyses.iter().rev() {
        records.push(StructuredRecord::from_json(&analysis.structured_json)?);
    }

    match deps.llm.compare(&records).await {
        Ok(comparison) => {
            send_chunked(bot, chat_id, &comparison, Some(menu::main_menu_keyboard())).await?;
        }
        Err(e) => {
            log::warn!("Comparison failed for user {}: {}", user_id, e);
            bot.send_message(chat_id, texts::STRUCTURING_FAILED).await?;
        }
    }
    Ok(())
}

/// List the user's retained analyses.
pub async fn show_analyses_list(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let analyses = {
        let conn = get_connection(&deps.db_pool)?;
        db::get_recent_analyses(&conn, chat_id.0, config::retention::MAX_STORED_ANALYSES)?
    };

    if analyses.is_empty() {
        bot.send_message(chat_id, texts::NO_ANALYSES)
            .reply_markup(menu::main_menu_keyboard())
            .await?;
        return Ok(());
    }

    bot.send_message(chat_id, "Ваши сохранённые разборы:")
        .reply_markup(menu::analyses_keyboard(&analyses))
        .await?;
    Ok(())
}

/// Re-send a stored report and point the session at it.
pub async fn open_analysis(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, analysis_id: i64) -> Result<(), HandlerError> {
    let (analysis, asked) = {
        let conn = get_connection(&deps.db_pool)?;
        let Some(analysis) = db::get_analysis(&conn, analysis_id, chat_id.0)? else {
            bot.send_message(chat_id, texts::NO_ANALYSES).await?;
            return Ok(());
        };
        let asked = db::count_follow_ups(&conn, analysis_id)?;
        (analysis, asked)
    };

    let mut session = deps.sessions.load(chat_id.0).await?;
    session.reset();
    session.state = SessionState::ReportReady;
    session.current_analysis_id = Some(analysis.id);
    deps.sessions.save(chat_id.0, &session).await?;

    let full = format!("{}\n\n{}", analysis.report_text, texts::REPORT_FOOTER);
    let remaining = config::limits::MAX_FOLLOW_UPS - asked;
    send_chunked(bot, chat_id, &full, Some(menu::report_keyboard(remaining))).await?;
    Ok(())
}

/// Subscription status screen: plan window plus remaining analyses.
pub async fn show_subscription_status(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user = {
        let conn = get_connection(&deps.db_pool)?;
        db::get_user(&conn, chat_id.0)?
    };

    let text = match user {
        Some(user) if subscription::is_active(&user, Utc::now()) => {
            let expires = user
                .subscription_expires_at
                .map(|e| e.format("%d.%m.%Y").to_string())
                .unwrap_or_else(|| "—".to_string());
            let remaining = if subscription::is_unlimited(&user) {
                "безлимит".to_string()
            } else {
                subscription::remaining_analyses(&user).to_string()
            };
            format!(
                "💳 Подписка активна до {}.\nДоступно разборов: {}.\n\nПродлить или расширить:",
                expires, remaining
            )
        }
        _ => "У вас нет активной подписки. Выберите тариф:".to_string(),
    };

    bot.send_message(chat_id, text).reply_markup(menu::plans_keyboard()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::subscription::plan_by_id;
    use crate::extract::DocumentExtractor;
    use crate::llm::Structurer;
    use crate::payments::PaymentService;
    use crate::session::context::ContextAnswers;
    use crate::session::{SessionStore, UserLocks};
    use crate::storage::create_pool;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const USER: i64 = 42;

    struct FakeExtractor;

    #[async_trait]
    impl DocumentExtractor for FakeExtractor {
        async fn extract(&self, _bytes: &[u8], _kind: SupportedFileKind) -> crate::core::error::AppResult<String> {
            Ok("Гемоглобин 140 г/л".to_string())
        }
    }

    struct FakeStructurer {
        fail_structure: bool,
        fail_report: bool,
    }

    impl FakeStructurer {
        fn ok() -> Self {
            Self {
                fail_structure: false,
                fail_report: false,
            }
        }
    }

    #[async_trait]
    impl Structurer for FakeStructurer {
        async fn structure(&self, _text: &str, _context: &ContextAnswers) -> crate::core::error::AppResult<StructuredRecord> {
            if self.fail_structure {
                return Err(AppError::Structuring("upstream 500".to_string()));
            }
            Ok(StructuredRecord { analytes: vec![] })
        }

        async fn report(&self, _record: &StructuredRecord, _context: &ContextAnswers) -> crate::core::error::AppResult<String> {
            if self.fail_report {
                return Err(AppError::Structuring("upstream 500".to_string()));
            }
            Ok("Все показатели в норме.".to_string())
        }

        async fn compare(&self, _records: &[StructuredRecord]) -> crate::core::error::AppResult<String> {
            Ok("Динамика без изменений.".to_string())
        }

        async fn answer_follow_up(&self, _record: &StructuredRecord, _question: &str) -> crate::core::error::AppResult<String> {
            Ok("Ответ.".to_string())
        }
    }

    /// A bot pointed at a local server that acknowledges every send.
    async fn mock_bot() -> (MockServer, Bot) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"(?i)/bot[^/]+/sendmessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {
                    "message_id": 1,
                    "date": 1234567890,
                    "chat": {"id": USER, "type": "private", "first_name": "Test"},
                    "text": "ok"
                }
            })))
            .mount(&server)
            .await;
        let bot = Bot::new("test_token_12345:ABCDEF").set_api_url(server.uri().parse().unwrap());
        (server, bot)
    }

    async fn test_deps(structurer: FakeStructurer) -> (tempfile::TempDir, HandlerDeps) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        let pool = Arc::new(create_pool(db_path.to_str().unwrap()).unwrap());
        let payments = PaymentService::new(
            "http://127.0.0.1:9".to_string(),
            "shop".to_string(),
            "key".to_string(),
            "https://t.me/test".to_string(),
        )
        .unwrap();
        let deps = HandlerDeps::new(
            pool,
            Arc::new(SessionStore::connect(None).await),
            Arc::new(UserLocks::new()),
            Arc::new(FakeExtractor),
            Arc::new(structurer),
            Arc::new(payments),
        );
        (dir, deps)
    }

    fn user_row(deps: &HandlerDeps) -> db::User {
        let conn = get_connection(&deps.db_pool).unwrap();
        db::get_user(&conn, USER).unwrap().unwrap()
    }

    fn processing_session() -> Session {
        let mut session = Session::idle();
        session.state = SessionState::Processing;
        session.extracted_text = Some("Гемоглобин 140 г/л".to_string());
        session
    }

    #[tokio::test]
    async fn test_quota_denial_ends_session_without_spending_a_unit() {
        let (_server, bot) = mock_bot().await;
        let (_dir, deps) = test_deps(FakeStructurer::ok()).await;
        {
            let conn = get_connection(&deps.db_pool).unwrap();
            db::create_user(&conn, USER, None, None).unwrap();
        }

        let mut session = processing_session();
        process_analysis(&bot, ChatId(USER), &deps, &mut session).await.unwrap();

        assert_eq!(session.state, SessionState::Idle);
        let user = user_row(&deps);
        assert_eq!(user.used_requests, 0);
        let conn = get_connection(&deps.db_pool).unwrap();
        assert_eq!(db::count_analyses(&conn, USER).unwrap(), 0);
        // The stored session matches the one we were handed back
        assert_eq!(deps.sessions.load(USER).await.unwrap().state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_structuring_failure_returns_the_unit_and_ends_the_session() {
        let (_server, bot) = mock_bot().await;
        let (_dir, deps) = test_deps(FakeStructurer {
            fail_structure: true,
            fail_report: false,
        })
        .await;
        {
            let conn = get_connection(&deps.db_pool).unwrap();
            db::create_user(&conn, USER, None, None).unwrap();
            db::activate_subscription(&conn, USER, plan_by_id("1month").unwrap(), Utc::now()).unwrap();
        }

        let mut session = processing_session();
        process_analysis(&bot, ChatId(USER), &deps, &mut session).await.unwrap();

        let user = user_row(&deps);
        assert_eq!(user.used_requests, 0);
        assert_eq!(session.state, SessionState::Idle);
        let conn = get_connection(&deps.db_pool).unwrap();
        assert_eq!(db::count_analyses(&conn, USER).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_report_failure_returns_the_unit_too() {
        let (_server, bot) = mock_bot().await;
        let (_dir, deps) = test_deps(FakeStructurer {
            fail_structure: false,
            fail_report: true,
        })
        .await;
        {
            let conn = get_connection(&deps.db_pool).unwrap();
            db::create_user(&conn, USER, None, None).unwrap();
            db::activate_subscription(&conn, USER, plan_by_id("1month").unwrap(), Utc::now()).unwrap();
        }

        let mut session = processing_session();
        process_analysis(&bot, ChatId(USER), &deps, &mut session).await.unwrap();

        assert_eq!(user_row(&deps).used_requests, 0);
        assert_eq!(session.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_successful_analysis_spends_one_unit_and_presents_the_report() {
        let (_server, bot) = mock_bot().await;
        let (_dir, deps) = test_deps(FakeStructurer::ok()).await;
        {
            let conn = get_connection(&deps.db_pool).unwrap();
            db::create_user(&conn, USER, None, None).unwrap();
            db::activate_subscription(&conn, USER, plan_by_id("1month").unwrap(), Utc::now()).unwrap();
        }

        let mut session = processing_session();
        process_analysis(&bot, ChatId(USER), &deps, &mut session).await.unwrap();

        assert_eq!(session.state, SessionState::ReportReady);
        assert!(session.current_analysis_id.is_some());
        assert_eq!(session.extracted_text, None);
        assert_eq!(user_row(&deps).used_requests, 1);
        let conn = get_connection(&deps.db_pool).unwrap();
        assert_eq!(db::count_analyses(&conn, USER).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_document_keeps_waiting_for_an_upload() {
        let (_server, bot) = mock_bot().await;
        let (_dir, deps) = test_deps(FakeStructurer::ok()).await;
        {
            let conn = get_connection(&deps.db_pool).unwrap();
            db::create_user(&conn, USER, None, None).unwrap();
            db::activate_subscription(&conn, USER, plan_by_id("1month").unwrap(), Utc::now()).unwrap();
        }

        let mut session = Session::idle();
        session.state = SessionState::AwaitingUpload;
        deps.sessions.save(USER, &session).await.unwrap();

        let msg: Message = serde_json::from_value(serde_json::json!({
            "message_id": 1,
            "date": 1234567890,
            "chat": {"id": USER, "type": "private", "first_name": "Test"},
            "from": {"id": USER, "is_bot": false, "first_name": "Test"},
            "document": {
                "file_id": "f1",
                "file_unique_id": "u1",
                "file_size": 10,
                "file_name": "archive.zip",
                "mime_type": "application/zip"
            }
        }))
        .unwrap();

        handle_upload(&bot, &msg, &deps).await.unwrap();

        let stored = deps.sessions.load(USER).await.unwrap();
        assert_eq!(stored.state, SessionState::AwaitingUpload);
        assert_eq!(user_row(&deps).used_requests, 0);
    }
}
