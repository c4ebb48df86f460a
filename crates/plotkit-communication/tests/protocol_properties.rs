use plotkit_communication::firmware::grbl::{prepare_line, split_lines};
use plotkit_communication::{GrblResponse, RealtimeCommand, StatusParser};
use proptest::prelude::*;

proptest! {
    #[test]
    fn any_line_classifies_without_panicking(line in "\\PC{0,64}") {
        let _ = GrblResponse::parse(&line);
        let _ = StatusParser::parse(&line);
    }

    #[test]
    fn status_frames_with_garbage_fields_still_classify(
        state in "(Idle|Run|Hold:0|Alarm|Jog)",
        fields in prop::collection::vec("[A-Za-z]{1,4}:[-0-9.,a-z]{0,12}", 0..6),
    ) {
        let frame = format!("<{}|{}>", state, fields.join("|"));
        let report = StatusParser::parse(&frame);
        prop_assert!(report.is_some());
        prop_assert!(matches!(
            GrblResponse::parse(&frame),
            Some(GrblResponse::Status(_))
        ));
    }

    #[test]
    fn prepared_lines_carry_no_comments(
        code in "[GXYZF0-9. ]{0,20}",
        comment in "[a-z ]{0,10}",
    ) {
        let line = format!("{} ({}) ; {}", code, comment, comment);
        if let Some(prepared) = prepare_line(&line) {
            prop_assert!(!prepared.contains('('));
            prop_assert!(!prepared.contains(';'));
            prop_assert_eq!(prepared.as_str(), prepared.trim());
        }
    }

    #[test]
    fn split_lines_yields_trimmed_non_empty(parts in prop::collection::vec("[a-z:0-9 ]{0,8}", 0..8)) {
        let message = parts.join("\r\n");
        for line in split_lines(&message) {
            prop_assert!(!line.is_empty());
            prop_assert_eq!(line, line.trim());
        }
    }

    #[test]
    fn realtime_bytes_map_back(byte in any::<u8>()) {
        if let Some(command) = RealtimeCommand::from_byte(byte) {
            prop_assert_eq!(command.byte(), byte);
        }
    }
}
