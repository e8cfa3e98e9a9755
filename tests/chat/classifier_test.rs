//! Line classification against the bundled format profiles.

use mcrelay::chat::{ChatError, ChatEvent, FormatProfile, LineClassifier, ServerStatus};

const DEDICATED: &str =
    "[14Dec2023 07:29:06.982] [Server thread/INFO] [net.minecraft.server.dedicated.DedicatedServer/]: ";
const MINECRAFT: &str =
    "[14Dec2023 07:29:06.982] [Server thread/INFO] [net.minecraft.server.MinecraftServer/]: ";

fn rcon() -> LineClassifier {
    LineClassifier::new(FormatProfile::rcon_markers().expect("profile")).expect("classifier")
}

fn forge() -> LineClassifier {
    LineClassifier::new(FormatProfile::forge_banners().expect("profile")).expect("classifier")
}

fn message(text: &str, username: Option<&str>) -> ChatEvent {
    ChatEvent::PlayerMessage {
        text: text.to_owned(),
        username: username.map(str::to_owned),
    }
}

#[test]
fn chat_line_is_stripped_to_body() {
    let event = rcon().classify(&format!("{DEDICATED}<Iluvator> TEST"), ServerStatus::Running);
    assert_eq!(event, message("<Iluvator> TEST", Some("Iluvator")));
}

#[test]
fn event_sentences_keep_their_actor() {
    let c = rcon();
    for body in [
        "Iluvator joined the game",
        "Iluvator left the game",
        "Iluvator was slain by Zombie",
        "MACTEP has reached the goal [Pink Unicorn]",
    ] {
        let event = c.classify(&format!("{DEDICATED}{body}"), ServerStatus::Running);
        let expected_user = body.split(' ').next();
        assert_eq!(event, message(body, expected_user), "line: {body}");
    }
}

#[test]
fn not_secure_tag_is_removed_on_newer_servers() {
    let event = rcon().classify(
        &format!("{MINECRAFT}[Not Secure] <Steve_2> hello there"),
        ServerStatus::Running,
    );
    assert_eq!(event, message("<Steve_2> hello there", Some("Steve_2")));
}

#[test]
fn command_feedback_has_no_username() {
    let event = rcon().classify(
        &format!("{DEDICATED}[Iluvator: Set own game mode to Creative Mode]"),
        ServerStatus::Running,
    );
    assert_eq!(
        event,
        message("[Iluvator: Set own game mode to Creative Mode]", None)
    );
}

#[test]
fn lines_without_gate_prefix_are_ignored() {
    let c = rcon();
    let line = "test 1 [net.minecraft.server.dedicated.DedicatedServer/]: test message";
    assert_eq!(c.classify(line, ServerStatus::Running), ChatEvent::NoEvent);
    assert_eq!(
        c.classify("[14Dec2023 07:29:06.982] [main/INFO] [cp.mo.mo.Launcher/MODLAUNCHER]: hi", ServerStatus::Running),
        ChatEvent::NoEvent
    );
    assert_eq!(c.classify("", ServerStatus::Running), ChatEvent::NoEvent);
}

#[test]
fn chat_is_ignored_while_server_is_down() {
    let c = rcon();
    let line = format!("{DEDICATED}<Iluvator> TEST");
    assert_eq!(c.classify(&line, ServerStatus::Stopped), ChatEvent::NoEvent);
    assert_eq!(c.classify(&line, ServerStatus::Starting), ChatEvent::NoEvent);
}

#[test]
fn rcon_markers_flip_status() {
    let c = rcon();
    let stopped = "[25Nov2024 23:05:38.154] [Server thread/INFO] [net.minecraft.server.MinecraftServer/]: [Rcon] SERVER STOPPED...";
    let started = "[25Nov2024 23:03:38.562] [Server thread/INFO] [net.minecraft.server.MinecraftServer/]: [Rcon] SERVER STARTED!!!";
    assert_eq!(
        c.classify(stopped, ServerStatus::Running),
        ChatEvent::ServerStatusChanged(ServerStatus::Stopped)
    );
    assert_eq!(
        c.classify(started, ServerStatus::Stopped),
        ChatEvent::ServerStatusChanged(ServerStatus::Running)
    );
}

#[test]
fn status_markers_win_over_chat_shape() {
    let line = format!("{MINECRAFT}[Rcon] SERVER STOPPED...\r\n");
    assert_eq!(
        rcon().classify(&line, ServerStatus::Running),
        ChatEvent::ServerStatusChanged(ServerStatus::Stopped)
    );
}

#[test]
fn forge_banners_track_boot_sequence() {
    let c = forge();
    assert!(c.profile().detects_starting());
    assert_eq!(
        c.detect_status("[25Nov2024 23:01:00.001] [main/INFO] [cp.mo.mo.Launcher/MODLAUNCHER]: ModLauncher running: args [--launchTarget, forgeserver]"),
        Some(ServerStatus::Starting)
    );
    assert_eq!(
        c.detect_status("[25Nov2024 23:02:11.500] [VoiceChatServerThread/INFO] [voicechat/]: Voice chat server started at port 24454"),
        Some(ServerStatus::Running)
    );
    assert_eq!(
        c.detect_status("[25Nov2024 23:02:11.900] [Server thread/INFO] [net.minecraft.server.dedicated.DedicatedServer/]: RCON running on 0.0.0.0:25575"),
        Some(ServerStatus::Running)
    );
    assert_eq!(
        c.detect_status(&format!("{MINECRAFT}Stopping server")),
        Some(ServerStatus::Stopped)
    );
    assert!(!rcon().profile().detects_starting());
}

#[test]
fn stripping_is_idempotent() {
    let c = rcon();
    let line = format!("{MINECRAFT}[Not Secure] <Alex> hi");
    let once = c.strip_prefixes(&line);
    assert_eq!(once, "<Alex> hi");
    assert_eq!(c.strip_prefixes(once), once);
    assert_eq!(c.strip_prefixes("nothing to strip"), "nothing to strip");
}

#[test]
fn usernames_follow_the_player_name_shape() {
    let c = rcon();
    assert_eq!(c.extract_username("<Iluvator> TEST").as_deref(), Some("Iluvator"));
    assert_eq!(c.extract_username("<Mr_Fox2> hi").as_deref(), Some("Mr_Fox2"));
    assert_eq!(c.extract_username("<_x> hi"), None);
    assert_eq!(c.extract_username("Steve"), None);
    assert_eq!(c.extract_username(""), None);
}

#[test]
fn unknown_profile_is_rejected() {
    let err = FormatProfile::by_name("bukkit").expect_err("unknown profile");
    assert!(matches!(err, ChatError::UnknownProfile(ref name) if name == "bukkit"));
    for name in FormatProfile::NAMES {
        assert_eq!(FormatProfile::by_name(name).expect("bundled profile").name(), name);
    }
}

#[test]
fn status_round_trips_through_its_name() {
    for status in [ServerStatus::Stopped, ServerStatus::Starting, ServerStatus::Running] {
        assert_eq!(status.to_string().parse::<ServerStatus>(), Ok(status));
    }
    assert!("paused".parse::<ServerStatus>().is_err());
    assert_eq!(ServerStatus::from_running(false), ServerStatus::Stopped);
}
