//! Launch-at-login via a per-user launchd LaunchAgent.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::config::LoginItemConfig;
use crate::error::ExternalServiceError;

/// Something that can start the app when the user logs in.
pub trait LoginItem {
    /// Install (`true`) or remove (`false`) the login item.
    fn enable(&self, enabled: bool) -> Result<(), ExternalServiceError>;

    /// Whether an installed login item points at this binary.
    fn is_enabled(&self) -> bool;
}

/// LaunchAgent property list in `~/Library/LaunchAgents`, loaded with launchctl.
pub struct LaunchAgent {
    label: String,
    program: PathBuf,
    plist_path: PathBuf,
    launchctl: PathBuf,
}

impl LaunchAgent {
    /// Build from config, pointing the agent at the running executable.
    pub fn from_config(config: &LoginItemConfig) -> Result<Self, ExternalServiceError> {
        let agents_dir = match &config.agents_dir {
            Some(dir) => PathBuf::from(crate::config::expand_path(dir)),
            None => dirs::home_dir()
                .ok_or(ExternalServiceError::NoHomeDir)?
                .join("Library")
                .join("LaunchAgents"),
        };
        let program = std::env::current_exe()?;
        Ok(Self::new(&config.label, program, &agents_dir, &config.launchctl))
    }

    pub fn new(label: &str, program: PathBuf, agents_dir: &Path, launchctl: &str) -> Self {
        Self {
            label: label.to_string(),
            program,
            plist_path: agents_dir.join(format!("{}.plist", label)),
            launchctl: PathBuf::from(launchctl),
        }
    }

    /// Where the descriptor lives.
    pub fn plist_path(&self) -> &Path {
        &self.plist_path
    }

    /// Render the property list for this agent.
    pub fn render_plist(&self) -> String {
        let label = xml_escape(&self.label);
        let program = xml_escape(&self.program.to_string_lossy());
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{program}</string>
        <string>daemon</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardOutPath</key>
    <string>/tmp/{label}.stdout</string>
    <key>StandardErrorPath</key>
    <string>/tmp/{label}.stderr</string>
</dict>
</plist>
"#
        )
    }

    fn install(&self) -> Result<(), ExternalServiceError> {
        if let Some(dir) = self.plist_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.plist_path, self.render_plist())?;
        set_mode_644(&self.plist_path)?;
        self.launchctl(&["load", "-w"])?;
        info!(path = %self.plist_path.display(), "Installed LaunchAgent");
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ExternalServiceError> {
        if !self.plist_path.exists() {
            debug!("LaunchAgent not installed, nothing to remove");
            return Ok(());
        }
        self.launchctl(&["unload", "-w"])?;
        fs::remove_file(&self.plist_path)?;
        info!(path = %self.plist_path.display(), "Removed LaunchAgent");
        Ok(())
    }

    fn launchctl(&self, args: &[&str]) -> Result<(), ExternalServiceError> {
        let output = Command::new(&self.launchctl)
            .args(args)
            .arg(&self.plist_path)
            .output()?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ExternalServiceError::Launchctl {
                status: output.status.code().unwrap_or(-1),
                output: text.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl LoginItem for LaunchAgent {
    fn enable(&self, enabled: bool) -> Result<(), ExternalServiceError> {
        if enabled {
            self.install()
        } else {
            self.uninstall()
        }
    }

    fn is_enabled(&self) -> bool {
        let Ok(content) = fs::read_to_string(&self.plist_path) else {
            return false;
        };
        first_program_argument(&content)
            .map(|arg| arg == self.program.to_string_lossy())
            .unwrap_or(false)
    }
}

/// First `<string>` inside the `ProgramArguments` array, unescaped.
///
/// This is a text scan, not an XML parser: it handles any whitespace layout,
/// `<string/>`, a CDATA section and the five predefined entities. Comments
/// or numeric character references inside the array are not understood and
/// make the agent read as not enabled.
fn first_program_argument(plist: &str) -> Option<Cow<'_, str>> {
    let after_key = &plist[plist.find("<key>ProgramArguments</key>")?..];
    let array = &after_key[after_key.find("<array>")?..];
    let element = &array[array.find("<string")? + "<string".len()..];
    if element.trim_start().starts_with("/>") {
        return Some(Cow::Borrowed(""));
    }

    let start = element.find('>')? + 1;
    let end = element[start..].find("</string>")?;
    let value = element[start..start + end].trim();
    match value
        .strip_prefix("<![CDATA[")
        .and_then(|v| v.strip_suffix("]]>"))
    {
        Some(raw) => Some(Cow::Borrowed(raw)),
        None => Some(xml_unescape(value)),
    }
}

fn xml_unescape(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        value
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(unix)]
fn set_mode_644(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_mode_644(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
