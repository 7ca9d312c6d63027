//! Command line surface: one subcommand per service operation, JSON out.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde_json::{json, Value};
use taskdeps_domain::{
    ChainDirection, DependencyType, DependencyUpdate, Direction, LogQuery, NewDependency,
    PreferenceUpdate, Task, TaskStatus,
};

use crate::app::Application;

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
fn parse_datetime(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid date: {value} (expected RFC 3339 or YYYY-MM-DD)"))
}

fn parse_dependency_type(value: &str) -> Result<DependencyType, String> {
    value.parse().map_err(|e: taskdeps_domain::DependencyError| e.to_string())
}

fn parse_status(value: &str) -> Result<TaskStatus, String> {
    value.parse().map_err(|e: taskdeps_domain::DependencyError| e.to_string())
}

fn id_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .required(true)
        .value_parser(value_parser!(i64))
        .help(help)
}

fn actor_arg() -> Arg {
    Arg::new("actor")
        .long("actor")
        .value_name("USER")
        .value_parser(value_parser!(i64))
        .help("执行操作的用户ID")
}

fn project_arg() -> Arg {
    Arg::new("project")
        .long("project")
        .value_name("ID")
        .value_parser(value_parser!(i64))
        .help("项目ID")
}

fn date_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("DATE")
        .value_parser(parse_datetime)
        .help(help)
}

fn limit_arg(default: &'static str) -> Arg {
    Arg::new("limit")
        .long("limit")
        .value_parser(value_parser!(i64))
        .default_value(default)
}

pub fn build_cli() -> Command {
    Command::new("taskdeps")
        .version(env!("CARGO_PKG_VERSION"))
        .about("任务依赖关系追踪与通知服务")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .value_name("URL")
                .global(true)
                .help("覆盖配置中的数据库URL"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("日志级别"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .global(true)
                .value_parser(["json", "text", "pretty"])
                .help("日志格式"),
        )
        .subcommand(Command::new("migrate").about("创建或升级数据库结构"))
        .subcommand(
            Command::new("task")
                .about("宿主任务管理")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .about("创建任务")
                        .arg(Arg::new("title").long("title").required(true))
                        .arg(project_arg())
                        .arg(date_arg("start", "计划开始时间"))
                        .arg(date_arg("due", "截止时间"))
                        .arg(
                            Arg::new("assignee")
                                .long("assignee")
                                .value_parser(value_parser!(i64))
                                .action(ArgAction::Append),
                        )
                        .arg(
                            Arg::new("watcher")
                                .long("watcher")
                                .value_parser(value_parser!(i64))
                                .action(ArgAction::Append),
                        )
                        .arg(
                            Arg::new("created-by")
                                .long("created-by")
                                .value_parser(value_parser!(i64)),
                        ),
                )
                .subcommand(
                    Command::new("dates")
                        .about("修改任务日期并重新检查依赖")
                        .arg(id_arg("task", "任务ID"))
                        .arg(date_arg("start", "计划开始时间"))
                        .arg(date_arg("due", "截止时间")),
                )
                .subcommand(
                    Command::new("status")
                        .about("修改任务状态")
                        .arg(id_arg("task", "任务ID"))
                        .arg(Arg::new("status").required(true).value_parser(parse_status))
                        .arg(
                            Arg::new("force")
                                .long("force")
                                .action(ArgAction::SetTrue)
                                .help("忽略未满足的前置依赖"),
                        ),
                )
                .subcommand(
                    Command::new("delete")
                        .about("删除任务及其全部依赖")
                        .arg(id_arg("task", "任务ID")),
                )
                .subcommand(
                    Command::new("order")
                        .about("项目内任务的拓扑顺序")
                        .arg(project_arg().required(true)),
                ),
        )
        .subcommand(
            Command::new("link")
                .about("创建依赖关系")
                .arg(id_arg("predecessor", "前置任务ID"))
                .arg(id_arg("successor", "后续任务ID"))
                .arg(
                    Arg::new("type")
                        .long("type")
                        .default_value("FS")
                        .value_parser(parse_dependency_type),
                )
                .arg(
                    Arg::new("lag")
                        .long("lag")
                        .value_name("HOURS")
                        .value_parser(value_parser!(i32))
                        .default_value("0"),
                )
                .arg(actor_arg())
                .arg(
                    Arg::new("silent")
                        .long("silent")
                        .action(ArgAction::SetTrue)
                        .help("不发送创建通知"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("修改依赖关系")
                .arg(id_arg("dependency", "依赖ID"))
                .arg(Arg::new("type").long("type").value_parser(parse_dependency_type))
                .arg(
                    Arg::new("lag")
                        .long("lag")
                        .value_name("HOURS")
                        .value_parser(value_parser!(i32)),
                )
                .arg(Arg::new("active").long("active").value_parser(value_parser!(bool)))
                .arg(actor_arg()),
        )
        .subcommand(
            Command::new("unlink")
                .about("删除依赖关系")
                .arg(id_arg("dependency", "依赖ID"))
                .arg(actor_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("查看依赖关系")
                .arg(id_arg("dependency", "依赖ID")),
        )
        .subcommand(
            Command::new("list")
                .about("列出任务的依赖关系")
                .arg(id_arg("task", "任务ID"))
                .arg(
                    Arg::new("direction")
                        .long("direction")
                        .default_value("both")
                        .value_parser(["predecessors", "successors", "both"]),
                )
                .arg(
                    Arg::new("include-inactive")
                        .long("include-inactive")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("project")
                .about("列出项目内的依赖关系")
                .arg(id_arg("project", "项目ID"))
                .arg(
                    Arg::new("include-inactive")
                        .long("include-inactive")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("chain")
                .about("沿依赖方向展开完整链路")
                .arg(id_arg("task", "任务ID"))
                .arg(
                    Arg::new("direction")
                        .long("direction")
                        .default_value("forward")
                        .value_parser(["forward", "backward"]),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("重新计算任务相关依赖的违规状态")
                .arg(id_arg("task", "任务ID")),
        )
        .subcommand(
            Command::new("cycle")
                .about("检查新增依赖是否会形成环")
                .arg(id_arg("predecessor", "前置任务ID"))
                .arg(id_arg("successor", "后续任务ID")),
        )
        .subcommand(
            Command::new("deadlines")
                .about("扫描即将到期的前置任务")
                .arg(date_arg("now", "以此时间代替当前时间")),
        )
        .subcommand(
            Command::new("deliver")
                .about("投递到期的待发送通知")
                .arg(limit_arg("50")),
        )
        .subcommand(
            Command::new("notifications")
                .about("依赖关系的通知历史")
                .arg(id_arg("dependency", "依赖ID"))
                .arg(limit_arg("20"))
                .arg(
                    Arg::new("offset")
                        .long("offset")
                        .value_parser(value_parser!(i64))
                        .default_value("0"),
                ),
        )
        .subcommand(
            Command::new("history")
                .about("用户的投递记录")
                .arg(id_arg("user", "用户ID"))
                .arg(limit_arg("50")),
        )
        .subcommand(
            Command::new("prefs")
                .about("通知偏好")
                .subcommand_required(true)
                .subcommand(
                    Command::new("show")
                        .arg(id_arg("user", "用户ID"))
                        .arg(project_arg()),
                )
                .subcommand(
                    Command::new("set")
                        .arg(id_arg("user", "用户ID"))
                        .arg(project_arg())
                        .arg(
                            Arg::new("json")
                                .long("json")
                                .required(true)
                                .help("偏好补丁, 例如 {\"enabled\":false}"),
                        ),
                ),
        )
}

fn required<'a, T: Clone + Send + Sync + 'static>(matches: &'a ArgMatches, name: &str) -> Result<&'a T> {
    matches
        .get_one::<T>(name)
        .ok_or_else(|| anyhow!("缺少参数: {name}"))
}

/// Runs one parsed command and returns its JSON result.
pub async fn execute(app: &Application, matches: &ArgMatches) -> Result<Value> {
    let service = app.service();
    let actor = |m: &ArgMatches| m.get_one::<i64>("actor").copied();

    let output = match matches.subcommand() {
        Some(("migrate", _)) => json!({ "migrated": true }),
        Some(("task", sub)) => execute_task(app, sub).await?,
        Some(("link", m)) => {
            let mut new = NewDependency::new(*required(m, "predecessor")?, *required(m, "successor")?)
                .with_type(*required::<DependencyType>(m, "type")?)
                .with_lag(*required(m, "lag")?);
            if m.get_flag("silent") {
                new = new.silent();
            }
            json!(service.create_dependency(new, actor(m)).await?)
        }
        Some(("update", m)) => {
            let update = DependencyUpdate {
                dependency_type: m.get_one::<DependencyType>("type").copied(),
                lag_time: m.get_one::<i32>("lag").copied(),
                is_active: m.get_one::<bool>("active").copied(),
                ..DependencyUpdate::default()
            };
            json!(service.update_dependency(*required(m, "dependency")?, update, actor(m)).await?)
        }
        Some(("unlink", m)) => json!(service.delete_dependency(*required(m, "dependency")?, actor(m)).await?),
        Some(("show", m)) => {
            let dependency = service.get_dependency(*required(m, "dependency")?).await?;
            json!({ "dependency": dependency, "info": dependency.info() })
        }
        Some(("list", m)) => {
            let direction: Direction = required::<String>(m, "direction")?.parse()?;
            json!(
                service
                    .list_task_dependencies(*required(m, "task")?, direction, m.get_flag("include-inactive"))
                    .await?
            )
        }
        Some(("project", m)) => json!(
            service
                .list_project_dependencies(*required(m, "project")?, m.get_flag("include-inactive"))
                .await?
        ),
        Some(("chain", m)) => {
            let direction: ChainDirection = required::<String>(m, "direction")?.parse()?;
            json!(service.dependency_chain(*required(m, "task")?, direction).await?)
        }
        Some(("check", m)) => json!(service.check_violations_for_task(*required(m, "task")?).await?),
        Some(("cycle", m)) => {
            let predecessor = *required::<i64>(m, "predecessor")?;
            let successor = *required::<i64>(m, "successor")?;
            json!({
                "predecessor": predecessor,
                "successor": successor,
                "wouldCreateCycle": service.check_circular(predecessor, successor).await?,
            })
        }
        Some(("deadlines", m)) => {
            let now = m.get_one::<DateTime<Utc>>("now").copied().unwrap_or_else(Utc::now);
            json!(service.check_deadlines(now).await?)
        }
        Some(("deliver", m)) => json!(app.delivery().process_due(*required(m, "limit")?).await?),
        Some(("notifications", m)) => json!(
            app.delivery()
                .notification_history(*required(m, "dependency")?, *required(m, "limit")?, *required(m, "offset")?)
                .await?
        ),
        Some(("history", m)) => {
            let query = LogQuery {
                limit: *required(m, "limit")?,
                ..LogQuery::default()
            };
            json!(app.delivery().user_history(*required(m, "user")?, &query).await?)
        }
        Some(("prefs", sub)) => match sub.subcommand() {
            Some(("show", m)) => json!(
                service
                    .preferences()
                    .get(*required(m, "user")?, m.get_one::<i64>("project").copied())
                    .await?
            ),
            Some(("set", m)) => {
                let update: PreferenceUpdate =
                    serde_json::from_str(required::<String>(m, "json")?).context("偏好补丁不是合法的JSON")?;
                json!(
                    service
                        .preferences()
                        .update(*required(m, "user")?, m.get_one::<i64>("project").copied(), &update)
                        .await?
                )
            }
            _ => return Err(anyhow!("未知的 prefs 子命令")),
        },
        _ => return Err(anyhow!("未知命令")),
    };

    Ok(output)
}

async fn execute_task(app: &Application, matches: &ArgMatches) -> Result<Value> {
    let service = app.service();

    let output = match matches.subcommand() {
        Some(("add", m)) => {
            let mut task = Task::new(required::<String>(m, "title")?.clone());
            task.project_id = m.get_one::<i64>("project").copied();
            task.start_date = m.get_one::<DateTime<Utc>>("start").copied();
            task.due_date = m.get_one::<DateTime<Utc>>("due").copied();
            task.created_by = m.get_one::<i64>("created-by").copied();
            task.assignees = m.get_many::<i64>("assignee").into_iter().flatten().copied().collect();
            task.watchers = m.get_many::<i64>("watcher").into_iter().flatten().copied().collect();
            json!(app.repositories().tasks.create(&task).await?)
        }
        Some(("dates", m)) => {
            let (task, reports) = service
                .update_task_dates(
                    *required(m, "task")?,
                    m.get_one::<DateTime<Utc>>("start").copied(),
                    m.get_one::<DateTime<Utc>>("due").copied(),
                )
                .await?;
            json!({ "task": task, "violations": reports })
        }
        Some(("status", m)) => {
            let task_id = *required::<i64>(m, "task")?;
            let status = *required::<TaskStatus>(m, "status")?;
            let validation = service.validate_status_change(task_id, status).await?;
            if !validation.valid && !m.get_flag("force") {
                json!({ "applied": false, "validation": validation })
            } else {
                let task = service.task_status_changed(task_id, status).await?;
                json!({ "applied": true, "task": task, "validation": validation })
            }
        }
        Some(("delete", m)) => json!(service.delete_task(*required(m, "task")?).await?),
        Some(("order", m)) => json!(service.project_task_order(*required(m, "project")?).await?),
        _ => return Err(anyhow!("未知的 task 子命令")),
    };

    Ok(output)
}
