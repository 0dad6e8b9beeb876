// `ls -la --time-style=long-iso` 输出解析（尽力而为）
//
// 行格式: drwxr-xr-x  2 ops ops 4096 2024-05-01 10:22 name
// 设备文件的大小列是 "major, minor"；符号链接名带 " -> target"。

use crate::models::file::join_remote_path;
use crate::models::FileEntry;

/// 解析整段输出，跳过 total 行、`.`/`..` 和无法识别的行
pub fn parse_ls_output(output: &str, base_path: &str) -> Vec<FileEntry> {
    output
        .lines()
        .filter_map(|line| parse_ls_line(line, base_path))
        .collect()
}

/// 解析单行
pub fn parse_ls_line(line: &str, base_path: &str) -> Option<FileEntry> {
    let mut rest = line.trim_end();
    let mode = take_field(&mut rest)?;
    let known_type = matches!(
        mode.as_bytes()[0],
        b'-' | b'd' | b'l' | b'c' | b'b' | b'p' | b's'
    );
    if mode.len() < 10 || !known_type {
        return None;
    }

    let _links = take_field(&mut rest)?;
    let _owner = take_field(&mut rest)?;
    let _group = take_field(&mut rest)?;

    let mut size_field = take_field(&mut rest)?;
    if size_field.ends_with(',') {
        // 设备文件：major, minor
        size_field = take_field(&mut rest)?;
    }
    let size = size_field.parse::<u64>().unwrap_or(0);

    let date = take_field(&mut rest)?;
    let time = take_field(&mut rest)?;
    if date.len() != 10 || date.as_bytes()[4] != b'-' {
        return None;
    }

    let mut name = rest.trim_start();
    if mode.starts_with('l') {
        if let Some((link, _target)) = name.split_once(" -> ") {
            name = link;
        }
    }
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let mod_time = if time.len() == 5 {
        format!("{} {}:00", date, time)
    } else {
        format!("{} {}", date, time)
    };

    Some(FileEntry {
        name: name.to_string(),
        path: join_remote_path(base_path, name),
        size,
        is_dir: mode.starts_with('d'),
        mode: mode.chars().take(10).collect(),
        mod_time,
    })
}

/// 取出下一个空白分隔字段，`rest` 前进到字段之后
fn take_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let s = rest.trim_start();
    if s.is_empty() {
        return None;
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (field, tail) = s.split_at(end);
    *rest = tail;
    Some(field)
}
