//! Built-in starting points for `devswitch create --template`.

use std::str::FromStr;

use crate::error::DevswitchError;
use crate::targets::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Corporate,
    Personal,
    Minimal,
}

impl Template {
    pub fn all() -> [Template; 3] {
        [Template::Corporate, Template::Personal, Template::Minimal]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Template::Corporate => "corporate",
            Template::Personal => "personal",
            Template::Minimal => "minimal",
        }
    }

    /// Files the template provides, in canonical target order
    pub fn files(&self) -> Vec<(Target, &'static str)> {
        match self {
            Template::Corporate => vec![
                (Target::Gitconfig, CORPORATE_GITCONFIG),
                (Target::Zshrc, CORPORATE_ZSHRC),
                (Target::Env, CORPORATE_ENV),
                (Target::Vscode, CORPORATE_VSCODE),
                (Target::Npmrc, CORPORATE_NPMRC),
            ],
            Template::Personal => vec![
                (Target::Gitconfig, PERSONAL_GITCONFIG),
                (Target::Zshrc, PERSONAL_ZSHRC),
                (Target::Env, PERSONAL_ENV),
                (Target::Vscode, PERSONAL_VSCODE),
                (Target::Npmrc, PERSONAL_NPMRC),
            ],
            Template::Minimal => vec![
                (Target::Gitconfig, MINIMAL_GITCONFIG),
                (Target::Zshrc, MINIMAL_ZSHRC),
                (Target::Vscode, MINIMAL_VSCODE),
            ],
        }
    }
}

impl FromStr for Template {
    type Err = DevswitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "corporate" | "work" => Ok(Template::Corporate),
            "personal" => Ok(Template::Personal),
            "minimal" => Ok(Template::Minimal),
            _ => Err(DevswitchError::UnknownTemplate(s.to_string())),
        }
    }
}

const CORPORATE_GITCONFIG: &str = "\
[user]
\tname = Corporate User
\temail = user@company.com
[init]
\tdefaultBranch = main
[pull]
\trebase = false
[core]
\tautocrlf = input
\teditor = code --wait
";

const CORPORATE_ZSHRC: &str = r#"# Corporate shell configuration
export PATH="/usr/local/bin:$PATH"
export EDITOR="code"

alias deploy="kubectl apply -f"
alias logs="kubectl logs -f"
alias status="git status"

[ -f ~/.company_profile ] && source ~/.company_profile
"#;

const CORPORATE_ENV: &str = "\
NODE_ENV=production
API_URL=https://api.company.com
LOG_LEVEL=info
";

const CORPORATE_VSCODE: &str = r#"{
    "editor.formatOnSave": true,
    "editor.codeActionsOnSave": {
        "source.organizeImports": "explicit"
    },
    "git.confirmSync": false,
    "workbench.colorTheme": "Default Dark Modern"
}
"#;

const CORPORATE_NPMRC: &str = "\
registry=https://registry.company.com/
save-exact=true
";

const PERSONAL_GITCONFIG: &str = "\
[user]
\tname = Your Name
\temail = your.personal@email.com
[init]
\tdefaultBranch = main
[pull]
\trebase = true
[core]
\teditor = vim
";

const PERSONAL_ZSHRC: &str = r#"# Personal shell configuration
export PATH="$HOME/bin:/usr/local/bin:$PATH"
export EDITOR="vim"

alias ll="ls -la"
alias ..="cd .."
alias gs="git status"
alias gp="git pull"
"#;

const PERSONAL_ENV: &str = "\
NODE_ENV=development
DEBUG=true
";

const PERSONAL_VSCODE: &str = r#"{
    "editor.fontSize": 14,
    "editor.tabSize": 2,
    "terminal.integrated.fontSize": 12,
    "git.autofetch": true
}
"#;

const PERSONAL_NPMRC: &str = "\
registry=https://registry.npmjs.org/
fund=false
";

const MINIMAL_GITCONFIG: &str = "\
[user]
\tname = User
\temail = user@example.com
[init]
\tdefaultBranch = main
";

const MINIMAL_ZSHRC: &str = r#"# Minimal shell configuration
export PATH="/usr/local/bin:$PATH"
alias ll="ls -la"
"#;

const MINIMAL_VSCODE: &str = r#"{
    "editor.formatOnSave": true
}
"#;
