//! Vanish markers, suppression and the persisted vanished set.

use std::fs;
use std::path::{Path, PathBuf};

use mcrelay::chat::{
    ChatEvent, MasterPerkiVanishmod, VanishConvention, VanishHandler, VanishMarker, VanishStore,
};

fn store_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("data").join("vanished.json")
}

fn persisted(path: &Path) -> Vec<String> {
    let raw = fs::read_to_string(path).expect("read vanish file");
    serde_json::from_str(&raw).expect("vanish file is a JSON array")
}

#[test]
fn convention_recognizes_both_markers() {
    let mod_ = MasterPerkiVanishmod::new().expect("patterns");
    assert_eq!(
        mod_.match_marker("[Iluvator: [Vanishmod] Iluvator vanished]"),
        Some(VanishMarker {
            username: "Iluvator".to_owned(),
            vanished: true,
        })
    );
    assert_eq!(
        mod_.match_marker("[Iluvator: [Vanishmod] Iluvator unvanished]"),
        Some(VanishMarker {
            username: "Iluvator".to_owned(),
            vanished: false,
        })
    );
    assert_eq!(
        mod_.match_marker("[Iluvator: Set own game mode to Creative Mode]"),
        None
    );
    assert_eq!(mod_.name(), "vanishmod-masterperki");
}

#[test]
fn synthetic_lines_mimic_presence_messages() {
    let gone = VanishMarker {
        username: "Steve".to_owned(),
        vanished: true,
    };
    let back = VanishMarker {
        vanished: false,
        ..gone.clone()
    };
    assert_eq!(gone.synthetic_line(), "Steve left the game");
    assert_eq!(back.synthetic_line(), "Steve joined the game");
}

#[test]
fn vanish_then_unvanish_restores_visibility() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = store_path(&dir);
    let mut handler = VanishHandler::master_perki(&path).expect("handler");

    assert_eq!(
        handler.process("[Steve: [Vanishmod] Steve vanished]", None),
        "Steve left the game"
    );
    assert!(handler.is_suppressed("steve"));
    assert_eq!(persisted(&path), vec!["steve".to_owned()]);

    assert_eq!(
        handler.process("[STEVE: [Vanishmod] STEVE unvanished]", None),
        "STEVE joined the game"
    );
    assert!(!handler.is_suppressed("Steve"));
    assert!(handler.store().is_empty());
    assert!(persisted(&path).is_empty());
}

#[test]
fn suppression_ignores_case() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut handler = VanishHandler::master_perki(store_path(&dir)).expect("handler");
    handler.apply(&VanishMarker {
        username: "Steve".to_owned(),
        vanished: true,
    });

    for name in ["Steve", "steve", "STEVE"] {
        let body = format!("<{name}> hello");
        assert_eq!(handler.dispose(&body, Some(name)), ChatEvent::NoEvent);
    }
    assert_eq!(
        handler.process("<Alex> hello", Some("Alex")),
        "<Alex> hello"
    );
}

#[test]
fn unvanishing_unknown_player_does_not_write() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = store_path(&dir);
    let mut handler = VanishHandler::master_perki(&path).expect("handler");

    let event = handler.dispose("[Ghost: [Vanishmod] Ghost unvanished]", None);
    assert!(matches!(event, ChatEvent::VanishMarker(ref m) if !m.vanished));
    assert!(!path.exists());
}

#[test]
fn unshaped_noise_is_dropped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut handler = VanishHandler::master_perki(store_path(&dir)).expect("handler");
    assert_eq!(
        handler.process("[Iluvator: Set own game mode to Creative Mode]", None),
        ""
    );
    assert_eq!(handler.process("", None), "");
}

#[test]
fn store_survives_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = store_path(&dir);
    {
        let mut store = VanishStore::load(&path);
        store.insert("Zed").expect("insert");
        store.insert("alex").expect("insert");
    }
    let store = VanishStore::load(&path);
    assert_eq!(store.len(), 2);
    assert_eq!(store.players().collect::<Vec<_>>(), vec!["alex", "zed"]);
    assert!(store.contains("ZED"));
}

#[test]
fn corrupt_or_misshapen_file_starts_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vanished.json");

    for contents in ["{not json", r#"{"players": ["steve"]}"#, "[1, 2, 3]"] {
        fs::write(&path, contents).expect("write fixture");
        assert!(VanishStore::load(&path).is_empty(), "contents: {contents}");
    }

    let mut store = VanishStore::load(&path);
    store.insert("steve").expect("overwrite corrupt file");
    assert_eq!(persisted(&path), vec!["steve".to_owned()]);
}

#[test]
fn remove_reports_whether_player_was_present() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = VanishStore::load(store_path(&dir));
    store.insert("Steve").expect("insert");
    assert!(store.remove("STEVE").expect("remove"));
    assert!(!store.remove("steve").expect("second remove"));
}
