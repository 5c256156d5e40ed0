use gtbot::command::{bucket_path, safe_string, Bucket, Command};
use gtbot::GtbotError;

const BOT: &str = "<@UBOT01>";

fn parse(text: &str) -> Result<Command, GtbotError> {
    Command::parse(&format!("{} {}", BOT, text), Some(BOT))
}

#[test]
fn upload_accepts_quoted_and_bare_paths() {
    for text in [
        "upload /mnt/seungmount/research/gt/cut_1/raw",
        "upload: `/mnt/seungmount/research/gt/cut_1/raw`",
        "upload, \"/mnt/seungmount/research/gt/cut_1/raw\"",
        "upload <~/mnt/seungmount/research/gt/cut_1/raw>",
    ] {
        assert_eq!(
            parse(text).unwrap(),
            Command::Upload {
                path: "/mnt/seungmount/research/gt/cut_1/raw".to_string(),
                bucket: Bucket::Scratch,
            },
            "{}",
            text
        );
    }
}

#[test]
fn save_targets_permanent_bucket() {
    let Command::Upload { bucket, .. } = parse("save /mnt/seungmount/a/b").unwrap() else {
        panic!("save is an upload");
    };
    assert_eq!(bucket, Bucket::Permanent);
}

#[test]
fn punctuation_after_mention_is_ignored() {
    let cmd = Command::parse(&format!("{}: create cutouts https://v.example/#!%7B%7D", BOT), Some(BOT));
    assert!(matches!(cmd, Ok(Command::CreateCutouts { .. })));
}

#[test]
fn create_cutouts_stops_at_closing_bracket() {
    let link = "https://v.example/#!%7B%22layers%22%3A%5B%5D%7D";
    let cmd = parse(&format!("create cutouts <{}>", link)).unwrap();
    assert_eq!(cmd, Command::CreateCutouts { link: link.to_string() });
}

#[test]
fn create_bbox_singular_and_plural() {
    let link = "https://v.example/?json_url=https://state.example/nglstate/123";
    for text in [format!("create bbox {}", link), format!("create bboxes: {}", link)] {
        assert_eq!(
            parse(&text).unwrap(),
            Command::CreateBboxes { link: link.to_string() }
        );
    }
}

#[test]
fn commands_must_lead_the_message() {
    let err = parse("please upload /tmp/x").unwrap_err();
    assert!(matches!(err, GtbotError::UnknownCommand(_)));
    assert!(err.to_string().starts_with("Sorry, I do not understand the message"));
}

#[test]
fn mounted_paths_map_into_the_bucket() {
    assert_eq!(
        bucket_path("/Users/me/seungmount/Omni/cut 1").as_deref(),
        Some("Omni/cut 1")
    );
    assert_eq!(bucket_path("Z:\\Omni\\cut_1").as_deref(), Some("Omni/cut_1"));
    assert_eq!(safe_string("a/b\\c:d"), "a_b_c_d");
}
