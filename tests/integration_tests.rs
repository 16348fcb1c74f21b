//! Integration tests for promptdriver sessions on real pseudo-terminals

use promptdriver::{ExpectError, Pattern, Session};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_basic_command_execution() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("echo Hello World")
        .expect("Failed to spawn command");

    let result = session
        .expect(Pattern::exact("Hello"))
        .await
        .expect("Failed to find 'Hello'");

    assert_eq!(result.matched, "Hello");
    assert_eq!(result.pattern_index, 0);
}

#[tokio::test]
async fn test_regex_with_captures() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("echo Logfile: /var/log/tool/cfg.log")
        .expect("Failed to spawn");

    let result = session
        .expect(Pattern::regex(r"Logfile:\s*(\S+?/\S+?\.log)").expect("Invalid regex"))
        .await
        .expect("Pattern not found");

    assert_eq!(result.capture(1), Some("/var/log/tool/cfg.log"));
    assert!(result.captures[0].starts_with("Logfile:"));
}

#[tokio::test]
async fn test_earliest_match_wins_over_list_order() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("echo SUCCESS then FAILURE")
        .expect("Failed to spawn");

    let patterns = [
        Pattern::exact("FAILURE"),
        Pattern::exact("SUCCESS"),
        Pattern::exact("ERROR"),
    ];

    let result = session
        .expect_any(&patterns)
        .await
        .expect("No pattern matched");

    assert_eq!(result.pattern_index, 1);
    assert_eq!(result.matched, "SUCCESS");
}

#[tokio::test]
async fn test_same_start_goes_to_lower_index() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("echo ERROR: \"socket.2\" does not exist")
        .expect("Failed to spawn");

    let patterns = [
        Pattern::regex(r"ERROR[^\r\n]*?does not exist").unwrap(),
        Pattern::regex(r"ERROR[^\r\n]*\r?\n").unwrap(),
    ];

    let result = session.expect_any(&patterns).await.expect("No pattern matched");
    assert_eq!(result.pattern_index, 0);
}

#[tokio::test]
async fn test_unfinished_error_line_is_not_taken_for_prompt() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn(r#"sh -c 'printf "ERROR: value must be >"; sleep 0.5; printf " 0\n> "'"#)
        .expect("Failed to spawn");

    let patterns = [
        Pattern::regex(r"ERROR[^\r\n]*?does not exist").unwrap(),
        Pattern::regex(r"ERROR[^\r\n]*\r?\n").unwrap(),
        Pattern::exact(">"),
    ];

    let result = assert_ok!(session.expect_any(&patterns).await);
    assert_eq!(result.pattern_index, 1);
    assert_eq!(result.matched.trim_end(), "ERROR: value must be > 0");
}

#[tokio::test]
async fn test_timeout_error() {
    let mut session = Session::builder()
        .timeout(Duration::from_millis(100))
        .spawn("sleep 2")
        .expect("Failed to spawn");

    let err = assert_err!(session.expect(Pattern::exact("NEVER_APPEARS")).await);
    match err {
        ExpectError::Timeout { duration } => assert_eq!(duration, Duration::from_millis(100)),
        other => panic!("Unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_timeout_pattern() {
    let mut session = Session::builder()
        .timeout(Duration::from_millis(100))
        .spawn("sleep 2")
        .expect("Failed to spawn");

    let patterns = [Pattern::exact("NEVER"), Pattern::Timeout];
    let result = assert_ok!(session.expect_any(&patterns).await);
    assert_eq!(result.pattern_index, 1);
}

#[tokio::test]
async fn test_explicit_timeout_overrides_session_timeout() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(30))
        .spawn("sleep 5")
        .expect("Failed to spawn");

    let started = std::time::Instant::now();
    let err = assert_err!(
        session
            .expect_any_within(&[Pattern::exact("NEVER")], Duration::from_millis(150))
            .await
    );
    assert!(matches!(err, ExpectError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(session.timeout(), Duration::from_secs(30));
}

#[tokio::test]
async fn test_set_timeout_applies_to_next_expect() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(30))
        .spawn("sleep 5")
        .expect("Failed to spawn");

    session.set_timeout(Duration::from_millis(100));
    let err = assert_err!(session.expect(Pattern::exact("NEVER")).await);
    assert!(matches!(
        err,
        ExpectError::Timeout { duration } if duration == Duration::from_millis(100)
    ));
}

#[tokio::test]
async fn test_eof_pattern() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("echo Quick")
        .expect("Failed to spawn");

    let result = assert_ok!(session.expect_any(&[Pattern::Eof]).await);
    assert_eq!(result.pattern_index, 0);
    assert!(result.before.contains("Quick"));
}

#[tokio::test]
async fn test_eof_error_without_eof_pattern() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("echo bye")
        .expect("Failed to spawn");

    let err = assert_err!(session.expect(Pattern::exact("NEVER")).await);
    assert!(matches!(err, ExpectError::Eof));
}

#[tokio::test]
async fn test_output_survives_timed_out_expect() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("sh -c 'echo early; sleep 1; echo late'")
        .expect("Failed to spawn");

    // Times out while "early" is already buffered
    let err = assert_err!(
        session
            .expect_any_within(&[Pattern::Eof], Duration::from_millis(300))
            .await
    );
    assert!(matches!(err, ExpectError::Timeout { .. }));

    let result = assert_ok!(session.expect(Pattern::exact("late")).await);
    assert!(result.before.contains("early"));
}

#[tokio::test]
async fn test_send_and_receive() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(10))
        .spawn("cat")
        .expect("Failed to spawn cat");

    session
        .send_line("Hello from test")
        .await
        .expect("Failed to send");

    let result = session
        .expect(Pattern::exact("Hello"))
        .await
        .expect("Failed to receive echo");

    assert_eq!(result.matched, "Hello");
}

#[tokio::test]
async fn test_control_character_send() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("cat")
        .expect("Failed to spawn cat");

    session.send(b"test\n").await.expect("Failed to send");
    // Ctrl-D closes cat's stdin
    session.send(&[0x04]).await.expect("Failed to send Ctrl-D");

    let result = assert_ok!(session.expect_any(&[Pattern::Eof]).await);
    assert!(result.before.contains("test"));
    assert_eq!(session.wait_exit(Duration::from_secs(2)).await, Some(0));
}

#[tokio::test]
async fn test_before_field() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("echo BEFORE_TEXT MARKER AFTER_TEXT")
        .expect("Failed to spawn");

    let result = session
        .expect(Pattern::exact("MARKER"))
        .await
        .expect("Pattern not found");

    assert_eq!(result.matched, "MARKER");
    assert!(result.before.contains("BEFORE_TEXT"));
    assert!(!result.before.contains("AFTER_TEXT"));

    let rest = assert_ok!(session.expect(Pattern::exact("AFTER_TEXT")).await);
    assert_eq!(rest.before, " ");
}

#[tokio::test]
async fn test_multiple_expects() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("printf 'First\\nSecond\\n'")
        .expect("Failed to spawn");

    let first = assert_ok!(session.expect(Pattern::exact("First")).await);
    assert_eq!(first.matched, "First");
    let second = assert_ok!(session.expect(Pattern::exact("Second")).await);
    assert_eq!(second.matched, "Second");
}

#[tokio::test]
async fn test_utf8_support() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("echo Hello 世界")
        .expect("Failed to spawn");

    let result = assert_ok!(session.expect(Pattern::exact("世界")).await);
    assert_eq!(result.matched, "世界");
}

#[tokio::test]
async fn test_ansi_stripping() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .strip_ansi(true)
        .spawn("printf '\\033[1mBold\\033[0m Text\\n'")
        .expect("Failed to spawn");

    let result = assert_ok!(session.expect(Pattern::exact("Bold Text")).await);
    assert_eq!(result.matched, "Bold Text");
}

#[tokio::test]
async fn test_transcript_keeps_everything() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .capture_transcript(true)
        .spawn("printf 'one\\ntwo\\nthree\\n'")
        .expect("Failed to spawn");

    assert_ok!(session.expect(Pattern::exact("two")).await);
    assert_ok!(session.expect_any(&[Pattern::Eof]).await);

    let transcript = session.transcript().expect("transcript enabled");
    assert!(transcript.contains("one"));
    assert!(transcript.contains("three"));
}

#[tokio::test]
async fn test_transcript_disabled_by_default() {
    let session = Session::spawn("echo nothing").expect("Failed to spawn");
    assert!(session.transcript().is_none());
}

#[tokio::test]
async fn test_before_keeps_output_larger_than_window() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(10))
        .max_buffer_size(1024)
        .spawn("sh -c 'seq 1 20000 | sed s/^/key=/; echo END'")
        .expect("Failed to spawn");

    let result = assert_ok!(session.expect(Pattern::exact("END")).await);
    let lines: Vec<&str> = result.before.lines().map(str::trim_end).collect();
    assert_eq!(lines.len(), 20000);
    assert_eq!(lines[0], "key=1");
    assert_eq!(lines[19999], "key=20000");
}

#[tokio::test]
async fn test_exit_code() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("sh -c 'exit 3'")
        .expect("Failed to spawn");

    assert_ok!(session.expect_any(&[Pattern::Eof]).await);
    assert_eq!(session.wait_exit(Duration::from_secs(2)).await, Some(3));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .spawn("sleep 30")
        .expect("Failed to spawn");

    assert!(session.is_alive().expect("status"));
    session.close();
    session.close();
    session.close();

    assert!(session.exit_status().is_some());
    let err = assert_err!(session.expect(Pattern::exact("x")).await);
    assert!(matches!(err, ExpectError::ProcessExited));
    assert_err!(session.send_line("x").await);
}

#[tokio::test]
async fn test_close_after_exit() {
    let mut session = Session::spawn("echo done").expect("Failed to spawn");
    assert_ok!(session.expect_any(&[Pattern::Eof]).await);
    session.close();
    assert_eq!(session.exit_status().map(|s| s.exit_code()), Some(0));
}

#[tokio::test]
async fn test_invalid_regex_pattern() {
    assert!(Pattern::regex("[invalid(").is_err());
}

#[tokio::test]
async fn test_empty_exact_pattern_rejected() {
    let mut session = Session::spawn("echo x").expect("Failed to spawn");
    let err = assert_err!(session.expect(Pattern::exact("")).await);
    assert!(matches!(err, ExpectError::PatternError(_)));
}

#[tokio::test]
async fn test_spawn_invalid_command() {
    assert!(Session::builder()
        .spawn("definitely_not_a_real_command_12345")
        .is_err());
    assert!(matches!(
        Session::builder().spawn("/nonexistent/dir/tool"),
        Err(ExpectError::SpawnError(_))
    ));
    assert!(matches!(
        Session::builder().spawn("   "),
        Err(ExpectError::SpawnError(_))
    ));
}

#[tokio::test]
async fn test_quoted_arguments() {
    let mut session = Session::spawn(r#"/bin/bash -c "echo 'a b'""#).expect("Failed to spawn");
    let result = assert_ok!(session.expect(Pattern::exact("a b")).await);
    assert_eq!(result.matched, "a b");
}
