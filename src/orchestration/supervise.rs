//! Watches the long-running background tasks of the process.

use futures::future::select_all;
use std::any::Any;
use thiserror::Error;
use tokio::task::JoinHandle;

/// A background task that was expected to run forever has ended.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskExit {
    #[error("{label} panicked: {message}")]
    Panicked { label: String, message: String },
    #[error("{label} stopped")]
    Stopped { label: String },
    #[error("{label} was cancelled")]
    Cancelled { label: String },
}

/// Resolves with the first of `tasks` to end. Never resolves for an empty set.
pub async fn first_task_exit(tasks: Vec<(String, JoinHandle<()>)>) -> TaskExit {
    if tasks.is_empty() {
        return std::future::pending().await;
    }
    let (labels, handles): (Vec<String>, Vec<JoinHandle<()>>) = tasks.into_iter().unzip();
    let (res, idx, _rest) = select_all(handles).await;
    let label = labels.into_iter().nth(idx).unwrap_or_default();
    match res {
        Ok(()) => TaskExit::Stopped { label },
        Err(e) if e.is_panic() => TaskExit::Panicked {
            label,
            message: panic_message(e.into_panic()),
        },
        Err(_) => TaskExit::Cancelled { label },
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn forever() -> JoinHandle<()> {
        tokio::spawn(std::future::pending::<()>())
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let tasks = vec![
            ("refresh router".to_string(), forever()),
            (
                "sync ethereum".to_string(),
                tokio::spawn(async {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    panic!("Liquidity curve updated out of time order at tick 500: 20 -> 10");
                }),
            ),
        ];

        let exit = first_task_exit(tasks).await;
        assert_eq!(
            exit,
            TaskExit::Panicked {
                label: "sync ethereum".to_string(),
                message: "Liquidity curve updated out of time order at tick 500: 20 -> 10"
                    .to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_returning_task_counts_as_stopped() {
        let tasks = vec![
            ("sync scroll".to_string(), forever()),
            ("refresh router".to_string(), tokio::spawn(async {})),
        ];
        let exit = first_task_exit(tasks).await;
        assert_eq!(
            exit,
            TaskExit::Stopped {
                label: "refresh router".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_no_tasks_never_exits() {
        let res =
            tokio::time::timeout(Duration::from_millis(20), first_task_exit(Vec::new())).await;
        assert!(res.is_err());
    }
}
