use pretty_assertions::assert_eq;

use gcli::wrappers::shell::{self, GeneratedCommand, Mode};
use gcli::wrappers::{GcliInvocation, WrapperError, DEFAULT_MODEL};

#[cfg(unix)]
#[test]
fn invocation_feeds_stdin_and_captures_reply() {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let echo = dir.path().join("fake-gcli");
    fs::write(&echo, "#!/bin/sh\ncat\n").unwrap();
    let failing = dir.path().join("broken-gcli");
    fs::write(&failing, "#!/bin/sh\nexit 3\n").unwrap();
    for script in [&echo, &failing] {
        fs::set_permissions(script, fs::Permissions::from_mode(0o755)).unwrap();
    }

    let prompt = shell::build_prompt(None, Some("bash"));
    let call = GcliInvocation {
        program: echo.to_str().unwrap(),
        model: DEFAULT_MODEL,
        temperature: shell::DEFAULT_TEMPERATURE,
        prompt: &prompt,
    };
    let output = call.run("ls -la ||| Lists all files\n", true).unwrap();
    assert_eq!(
        GeneratedCommand::parse(&output),
        Some(GeneratedCommand {
            command: "ls -la".into(),
            description: "Lists all files".into(),
        })
    );

    let call = GcliInvocation {
        program: failing.to_str().unwrap(),
        ..call
    };
    assert!(matches!(
        call.run("anything", true),
        Err(WrapperError::Failed { .. })
    ));

    let call = GcliInvocation {
        program: "/nonexistent/gcli",
        ..call
    };
    assert!(matches!(call.run("", true), Err(WrapperError::Spawn { .. })));
}

#[test]
fn dangerous_reply_in_quiet_mode_still_selects_print() {
    let generated = GeneratedCommand::parse("mkfs.ext4 /dev/sdb1|||Formats the partition").unwrap();
    assert!(shell::is_dangerous(&generated.command));
    assert_eq!(Mode::select(true, false, false, false).unwrap(), Mode::Print);
}
