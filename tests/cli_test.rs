use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

const HAMLET: &str = "To be, or not to be, that is the question:\r\n\
Whether 'tis nobler in the mind to suffer\r\n\
The slings and arrows of outrageous fortune,\r\n\
Or to take arms against a sea of troubles\r\n";

fn compress_test(txt: &[u8],cmp: Option<&[u8]>) -> STDRESULT {
    let mut cmd = Command::cargo_bin("statichuff")?;
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("message.txt");
    let out_path = temp_dir.path().join("message.huff");
    std::fs::write(&in_path,txt)?;
    cmd.arg("compress")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .success();
    let compressed = std::fs::read(&out_path)?;
    if let Some(expected) = cmp {
        assert_eq!(compressed,expected.to_vec());
    }
    let mut cmd = Command::cargo_bin("statichuff")?;
    let expanded_path = temp_dir.path().join("expanded.txt");
    cmd.arg("expand")
        .arg("-i").arg(&out_path)
        .arg("-o").arg(&expanded_path)
        .assert()
        .success();
    assert_eq!(std::fs::read(&expanded_path)?,txt.to_vec());
    Ok(())
}

#[test]
fn abracadabra() -> STDRESULT {
    let expected = hex::decode("618E349946A756E8ADC0")?;
    compress_test(b"abracadabra",Some(expected.as_slice()))
}

#[test]
fn hamlet() -> STDRESULT {
    compress_test(HAMLET.as_bytes(),None)
}

#[test]
fn binary_and_empty() -> STDRESULT {
    let bin: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    compress_test(&bin,None)?;
    compress_test(b"",Some(&[][..]))
}

#[test]
fn code_table() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("message.txt");
    std::fs::write(&in_path,"abracadabra")?;
    let mut cmd = Command::cargo_bin("statichuff")?;
    cmd.arg("table")
        .arg("-i").arg(&in_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("a => 0\n"))
        .stdout(predicate::str::contains("c => 100\n"))
        .stdout(predicate::str::contains("r => 111\n"))
        .stdout(predicate::str::contains("Message: 11 byte(s)"))
        .stdout(predicate::str::contains("Encoded: 3 byte(s)"));
    Ok(())
}

#[test]
fn code_table_from_artifact() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("message.huff");
    std::fs::write(&in_path,hex::decode("C300")?)?;
    let mut cmd = Command::cargo_bin("statichuff")?;
    cmd.arg("table")
        .arg("-x")
        .arg("-i").arg(&in_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[Freq: 1.00000] a => 0"))
        .stdout(predicate::str::contains("Message: 4 byte(s)"));
    Ok(())
}

#[test]
fn corrupt_input_fails() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let in_path = temp_dir.path().join("bad.huff");
    let out_path = temp_dir.path().join("bad.txt");
    // tree is cut off after the first leaf marker
    std::fs::write(&in_path,[0x40u8])?;
    let mut cmd = Command::cargo_bin("statichuff")?;
    cmd.arg("expand")
        .arg("-i").arg(&in_path)
        .arg("-o").arg(&out_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("EndOfStream"));
    Ok(())
}
