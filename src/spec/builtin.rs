//! Built-in spec catalogue
//!
//! A handful of everyday commands so completion works without a spec
//! directory. Specs on disk with the same name shadow these.

use futures_util::FutureExt;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::model::{ArgSpec, Generator, OptionSpec, Subcommand, SuggestionSpec, Template};
use super::registry::{SpecModule, StaticRegistry};
use crate::suggestion::SuggestionKind;

/// Registry holding every built-in spec. Trees are built on first lookup.
pub fn registry() -> StaticRegistry {
    let specs: [(&str, fn() -> Subcommand); 7] = [
        ("cargo", cargo),
        ("cd", cd),
        ("docker", docker),
        ("git", git),
        ("ls", ls),
        ("npm", npm),
        ("sudo", sudo),
    ];

    let mut registry = StaticRegistry::new();
    for (name, build) in specs {
        registry.insert(name, SpecModule::factory(move || Some(build())));
    }
    registry
}

fn git_branches() -> Generator {
    Generator::script(&["git", "branch", "--no-color"])
        .post_process(|output, _| parse_branches(output))
}

fn git_remotes() -> Generator {
    Generator::script(&["git", "remote"]).split_on("\n")
}

/// `git branch` output, current branch first
fn parse_branches(output: &str) -> Vec<SuggestionSpec> {
    let mut branches: Vec<SuggestionSpec> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("* (HEAD detached"))
        .map(|line| match line.strip_prefix("* ") {
            Some(current) => SuggestionSpec::new(current)
                .description("Current branch")
                .priority(75)
                .kind(SuggestionKind::Arg),
            None => SuggestionSpec::new(line)
                .description("Branch")
                .kind(SuggestionKind::Arg),
        })
        .collect();
    branches.sort_by_key(|b| std::cmp::Reverse(b.priority.unwrap_or_default()));
    branches
}

fn git() -> Subcommand {
    let pathspec = || {
        ArgSpec::new("pathspec")
            .description("Files to add")
            .optional()
            .variadic()
            .template(Template::Filepaths)
    };

    Subcommand::new("git")
        .description("Version control system")
        .option(
            OptionSpec::new(["-C"])
                .description("Run as if git was started in <path>")
                .arg(ArgSpec::new("path").template(Template::Folders))
                .persistent(),
        )
        .option(OptionSpec::new(["--no-pager"]).description("Do not pipe output into a pager").persistent())
        .option(OptionSpec::new(["-h", "--help"]).description("Show help").persistent())
        .option(OptionSpec::new(["--version"]).description("Print the git suite version"))
        .subcommand(
            Subcommand::new("add")
                .description("Add file contents to the index")
                .option(OptionSpec::new(["-A", "--all"]).description("Add all changes"))
                .option(OptionSpec::new(["-p", "--patch"]).description("Interactively add hunks"))
                .arg(pathspec()),
        )
        .subcommand(
            Subcommand::new("commit")
                .description("Record changes to the repository")
                .option(
                    OptionSpec::new(["-m", "--message"])
                        .description("Commit message")
                        .arg(ArgSpec::new("message").description("Commit message")),
                )
                .option(OptionSpec::new(["-a", "--all"]).description("Stage all modified files"))
                .option(OptionSpec::new(["--amend"]).description("Amend previous commit")),
        )
        .subcommand(
            Subcommand::new("checkout")
                .description("Switch branches or restore files")
                .option(
                    OptionSpec::new(["-b"])
                        .description("Create and checkout new branch")
                        .arg(ArgSpec::new("branch").description("New branch name")),
                )
                .arg(
                    ArgSpec::new("branch")
                        .description("Branch to checkout")
                        .optional()
                        .generator(git_branches()),
                ),
        )
        .subcommand(
            Subcommand::new("push")
                .description("Update remote refs")
                .option(OptionSpec::new(["-u", "--set-upstream"]).description("Set upstream for branch"))
                .option(
                    OptionSpec::new(["-f", "--force"])
                        .description("Force push")
                        .exclusive_on(["--force-with-lease"]),
                )
                .option(OptionSpec::new(["--force-with-lease"]).description("Force push unless the remote moved"))
                .arg(
                    ArgSpec::new("remote")
                        .description("Remote name")
                        .optional()
                        .generator(git_remotes()),
                )
                .arg(
                    ArgSpec::new("branch")
                        .description("Branch name")
                        .optional()
                        .generator(git_branches()),
                ),
        )
        .subcommand(
            Subcommand::new("pull")
                .description("Fetch and merge from remote")
                .option(OptionSpec::new(["--rebase"]).description("Rebase instead of merge")),
        )
        .subcommand(
            Subcommand::new("status")
                .description("Show working tree status")
                .option(OptionSpec::new(["-s", "--short"]).description("Short format"))
                .option(OptionSpec::new(["-b", "--branch"]).description("Show branch info")),
        )
        .subcommand(
            Subcommand::new("stash")
                .description("Stash the changes in a dirty working directory")
                .subcommand(Subcommand::new("push").description("Save local modifications"))
                .subcommand(Subcommand::new("pop").description("Apply and remove a stash"))
                .subcommand(Subcommand::new("list").description("List stash entries"))
                .subcommand(Subcommand::new("drop").description("Remove a stash entry")),
        )
        .subcommand(
            Subcommand::new("log")
                .description("Show commit logs")
                .option(OptionSpec::new(["--oneline"]).description("One line per commit"))
                .option(OptionSpec::new(["--graph"]).description("Draw the commit graph"))
                .option(
                    OptionSpec::new(["-n", "--max-count"])
                        .description("Limit the number of commits")
                        .arg(ArgSpec::new("number")),
                ),
        )
}

fn cd() -> Subcommand {
    Subcommand::new("cd")
        .description("Change the shell working directory")
        .arg(
            ArgSpec::new("directory")
                .optional()
                .template(Template::Folders)
                .suggestion(SuggestionSpec::new("~").description("Home directory").kind(SuggestionKind::Folder))
                .suggestion(SuggestionSpec::new("-").description("Previous directory").kind(SuggestionKind::Folder))
                .suggestion(SuggestionSpec::new("..").description("Parent directory").kind(SuggestionKind::Folder)),
        )
}

fn ls() -> Subcommand {
    Subcommand::new("ls")
        .description("List directory contents")
        .option(OptionSpec::new(["-l"]).description("List in long format"))
        .option(OptionSpec::new(["-a", "--all"]).description("Include entries starting with ."))
        .option(
            OptionSpec::new(["-1"])
                .description("One entry per line")
                .exclusive_on(["-l", "-C"]),
        )
        .option(OptionSpec::new(["-C"]).description("Multi-column output"))
        .option(OptionSpec::new(["-h"]).description("Human readable sizes"))
        .option(OptionSpec::new(["-W"]).description("Display whiteouts when scanning directories"))
        .arg(
            ArgSpec::new("directory")
                .optional()
                .variadic()
                .template(Template::Filepaths),
        )
}

fn sudo() -> Subcommand {
    Subcommand::new("sudo")
        .description("Execute a command as another user")
        .option(
            OptionSpec::new(["-u", "--user"])
                .description("Run the command as this user")
                .arg(ArgSpec::new("user")),
        )
        .option(OptionSpec::new(["-E", "--preserve-env"]).description("Preserve the user environment"))
        .arg(ArgSpec::new("command").description("Command to run").command())
}

fn cargo() -> Subcommand {
    let package = || {
        OptionSpec::new(["-p", "--package"])
            .description("Package to operate on")
            .arg(ArgSpec::new("spec"))
    };
    let release = || OptionSpec::new(["-r", "--release"]).description("Build optimized artifacts");

    Subcommand::new("cargo")
        .description("Rust package manager")
        .option(
            OptionSpec::new(["-v", "--verbose"])
                .description("Use verbose output")
                .exclusive_on(["-q", "--quiet"])
                .persistent(),
        )
        .option(
            OptionSpec::new(["-q", "--quiet"])
                .description("Do not print cargo log messages")
                .persistent(),
        )
        .subcommand(
            Subcommand::new(["build", "b"])
                .description("Compile the current package")
                .option(package())
                .option(release()),
        )
        .subcommand(
            Subcommand::new(["check", "c"])
                .description("Analyze the current package and report errors")
                .option(package()),
        )
        .subcommand(
            Subcommand::new(["test", "t"])
                .description("Run the tests")
                .option(package())
                .option(release())
                .arg(ArgSpec::new("testname").description("Test name filter").optional()),
        )
        .subcommand(
            Subcommand::new(["run", "r"])
                .description("Run a binary or example of the local package")
                .option(
                    OptionSpec::new(["--bin"])
                        .description("Name of the bin target to run")
                        .arg(ArgSpec::new("name")),
                )
                .option(release()),
        )
        .subcommand(Subcommand::new("fmt").description("Format the package sources"))
        .subcommand(Subcommand::new("clippy").description("Lint the package"))
}

fn docker() -> Subcommand {
    let containers = |all: bool| {
        let mut argv = vec!["docker", "ps", "--format", "{{.Names}}"];
        if all {
            argv.push("--all");
        }
        Generator::script(&argv).split_on("\n")
    };

    Subcommand::new("docker")
        .description("Container runtime")
        .subcommand(
            Subcommand::new("ps")
                .description("List containers")
                .option(OptionSpec::new(["-a", "--all"]).description("Show all containers"))
                .option(OptionSpec::new(["-q", "--quiet"]).description("Only display container IDs")),
        )
        .subcommand(
            Subcommand::new("images")
                .description("List images")
                .option(OptionSpec::new(["-a", "--all"]).description("Show all images")),
        )
        .subcommand(
            Subcommand::new("run")
                .description("Create and run a new container from an image")
                .option(OptionSpec::new(["-d", "--detach"]).description("Run in the background"))
                .option(OptionSpec::new(["-i", "--interactive"]).description("Keep STDIN open"))
                .option(OptionSpec::new(["-t", "--tty"]).description("Allocate a pseudo-TTY"))
                .option(OptionSpec::new(["--rm"]).description("Remove the container when it exits"))
                .option(
                    OptionSpec::new(["--name"])
                        .description("Container name")
                        .arg(ArgSpec::new("name")),
                )
                .arg(
                    ArgSpec::new("image").description("Image").generator(
                        Generator::script(&["docker", "images", "--format", "{{.Repository}}:{{.Tag}}"])
                            .split_on("\n"),
                    ),
                )
                .arg(ArgSpec::new("command").optional().variadic()),
        )
        .subcommand(
            Subcommand::new("exec")
                .description("Execute a command in a running container")
                .option(OptionSpec::new(["-i", "--interactive"]).description("Keep STDIN open"))
                .option(OptionSpec::new(["-t", "--tty"]).description("Allocate a pseudo-TTY"))
                .arg(ArgSpec::new("container").generator(containers(false)))
                .arg(ArgSpec::new("command").variadic()),
        )
        .subcommand(
            Subcommand::new(["logs"])
                .description("Fetch the logs of a container")
                .option(OptionSpec::new(["-f", "--follow"]).description("Follow log output"))
                .arg(ArgSpec::new("container").generator(containers(true))),
        )
        .subcommand(
            Subcommand::new(["stop"])
                .description("Stop one or more running containers")
                .arg(ArgSpec::new("container").variadic().generator(containers(false))),
        )
}

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

/// Scripts of a `package.json`, with their command as description
fn package_scripts(content: &str) -> Vec<SuggestionSpec> {
    match serde_json::from_str::<PackageJson>(content) {
        Ok(package) => package
            .scripts
            .into_iter()
            .map(|(name, command)| {
                SuggestionSpec::new(name)
                    .description(command)
                    .kind(SuggestionKind::Arg)
            })
            .collect(),
        Err(e) => {
            log::debug!("unreadable package.json: {}", e);
            vec![]
        }
    }
}

fn npm_scripts() -> Generator {
    Generator::custom(|_, _, context| {
        async move {
            let path = context.current_working_directory.join("package.json");
            let content = tokio::fs::read_to_string(&path).await?;
            Ok::<_, anyhow::Error>(package_scripts(&content))
        }
        .boxed()
    })
}

fn npm() -> Subcommand {
    Subcommand::new("npm")
        .description("Node package manager")
        .subcommand(
            Subcommand::new(["install", "i", "add"])
                .description("Install a package")
                .option(OptionSpec::new(["-D", "--save-dev"]).description("Save as a dev dependency"))
                .option(OptionSpec::new(["-g", "--global"]).description("Install globally"))
                .arg(ArgSpec::new("package").optional().variadic()),
        )
        .subcommand(
            Subcommand::new(["run", "run-script"])
                .description("Run a script from package.json")
                .arg(ArgSpec::new("script").description("Script to run").generator(npm_scripts())),
        )
        .subcommand(Subcommand::new(["test", "t"]).description("Run the test script"))
        .subcommand(Subcommand::new("init").description("Create a package.json file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecRegistry;

    #[test]
    fn test_registry_names() {
        assert_eq!(
            registry().names(),
            vec!["cargo", "cd", "docker", "git", "ls", "npm", "sudo"]
        );
    }

    #[test]
    fn test_factory_builds_tree() {
        let git = registry()
            .lookup("git")
            .and_then(SpecModule::into_subcommand)
            .unwrap();
        assert!(git.find_subcommand("status").is_some());
        assert!(git.find_subcommand("stash").is_some());
        assert!(registry().lookup("emacs").is_none());
    }

    #[test]
    fn test_parse_branches_current_first() {
        let branches = parse_branches("  feature/x\n* main\n  release\n");
        let names: Vec<&str> = branches
            .iter()
            .map(|b| b.names.as_ref().unwrap().primary())
            .collect();
        assert_eq!(names, vec!["main", "feature/x", "release"]);
        assert_eq!(branches[0].description.as_deref(), Some("Current branch"));
    }

    #[test]
    fn test_parse_branches_skips_detached_head() {
        let branches = parse_branches("* (HEAD detached at 1a2b3c)\n  main\n");
        assert_eq!(branches.len(), 1);
    }

    #[test]
    fn test_package_scripts() {
        let scripts = package_scripts(r#"{"name": "app", "scripts": {"test": "jest", "build": "tsc"}}"#);
        let names: Vec<&str> = scripts
            .iter()
            .map(|s| s.names.as_ref().unwrap().primary())
            .collect();
        assert_eq!(names, vec!["build", "test"]);
        assert_eq!(scripts[1].description.as_deref(), Some("jest"));

        assert!(package_scripts("not json").is_empty());
        assert!(package_scripts(r#"{"name": "app"}"#).is_empty());
    }
}
