// 远程 shell 命令拼装：路径转义与 sudo 包装

/// 需要加引号的 shell 特殊字符
const SHELL_SPECIAL: &[char] = &[
    ' ', '\t', '\n', '\r', '"', '\'', '\\', '$', '`', '|', '&', ';', '(', ')', '<', '>', '*', '?',
    '[', ']', '{', '}', '~', '#', '!',
];

/// 无条件用单引号包裹，内部单引号替换为 '"'"'
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

/// 转义远程路径
///
/// 路径含空白、控制字符、shell 元字符或非 ASCII 字符（如中文）时加单引号，否则原样返回。
pub fn escape_shell_path(path: &str) -> String {
    let needs_quote = path
        .chars()
        .any(|c| SHELL_SPECIAL.contains(&c) || c.is_control() || !c.is_ascii());

    if needs_quote {
        shell_quote(path)
    } else {
        path.to_string()
    }
}

/// 包装为 sudo 命令
///
/// 有密码时通过管道喂给 `sudo -S`（空提示符，避免提示文本混入输出）；
/// 没有密码时使用 `sudo -n`，需要密码则直接失败而不是挂起。
pub fn sudo_command(password: &str, command: &str) -> String {
    if password.is_empty() {
        format!("sudo -n {}", command)
    } else {
        format!(
            "printf '%s\\n' {} | sudo -S -p '' {}",
            shell_quote(password),
            command
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_path_is_not_quoted() {
        assert_eq!(escape_shell_path("/var/log/syslog"), "/var/log/syslog");
        assert_eq!(escape_shell_path("/opt/app-1.2_x/a.tar.gz"), "/opt/app-1.2_x/a.tar.gz");
    }

    #[test]
    fn test_space_and_non_ascii_are_quoted() {
        assert_eq!(escape_shell_path("/home/ops/my file"), "'/home/ops/my file'");
        assert_eq!(escape_shell_path("/home/ops/文档"), "'/home/ops/文档'");
        assert_eq!(escape_shell_path("/tmp/a;rm -rf ~"), "'/tmp/a;rm -rf ~'");
        assert_eq!(escape_shell_path("/tmp/a\u{7}b"), "'/tmp/a\u{7}b'");
    }

    #[test]
    fn test_embedded_single_quote() {
        assert_eq!(escape_shell_path("/tmp/it's"), r#"'/tmp/it'"'"'s'"#);
    }

    #[test]
    fn test_sudo_with_password() {
        assert_eq!(
            sudo_command("p'w", "mkdir -p /srv"),
            r#"printf '%s\n' 'p'"'"'w' | sudo -S -p '' mkdir -p /srv"#
        );
    }

    #[test]
    fn test_sudo_without_password() {
        assert_eq!(sudo_command("", "rm -f /srv/a"), "sudo -n rm -f /srv/a");
    }
}
