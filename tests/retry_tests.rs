use anyhow::{Result, anyhow};
use notify_service::{
    models::retry::RetryConfig,
    utils::{retry_with_backoff, retry_with_backoff_hinted},
};
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};
use tokio::time::{Duration, Instant};

/// Test: Successful operations complete without retry
#[tokio::test]
async fn test_successful_operation_no_retry() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 100,
        max_delay_ms: 1000,
        backoff_multiplier: 2,
    };

    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&config, || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("success")
        }
    })
    .await?;

    assert_eq!(result, "success");
    assert_eq!(
        attempt_count.load(Ordering::SeqCst),
        1,
        "Should only attempt once"
    );

    Ok(())
}

/// Test: Transient failures are retried with backoff
#[tokio::test]
async fn test_transient_failures_are_retried() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 5,
        initial_delay_ms: 20,
        max_delay_ms: 200,
        backoff_multiplier: 2,
    };

    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&config, || {
        let counter = Arc::clone(&counter);
        async move {
            let attempts = counter.fetch_add(1, Ordering::SeqCst);

            // Fail first 2 attempts, succeed on 3rd
            if attempts < 2 {
                Err(anyhow!("Transient error"))
            } else {
                Ok("success")
            }
        }
    })
    .await?;

    assert_eq!(result, "success");
    assert_eq!(
        attempt_count.load(Ordering::SeqCst),
        3,
        "Should retry 2 times then succeed"
    );

    Ok(())
}

/// Test: Permanent failures exhaust retries
#[tokio::test]
async fn test_permanent_failure_exhausts_retries() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 4,
        initial_delay_ms: 10,
        max_delay_ms: 100,
        backoff_multiplier: 2,
    };

    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff(&config, || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(anyhow!("Permanent failure"))
        }
    })
    .await;

    assert!(result.is_err(), "Should fail after max attempts");
    assert_eq!(
        attempt_count.load(Ordering::SeqCst),
        4,
        "Should attempt exactly max_attempts times"
    );

    Ok(())
}

/// Test: A retry hint overrides the computed backoff delay
#[tokio::test]
async fn test_hint_overrides_backoff_delay() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 2,
        initial_delay_ms: 1,
        max_delay_ms: 10,
        backoff_multiplier: 2,
    };

    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let started = Instant::now();
    let _ = retry_with_backoff_hinted(
        &config,
        |_e: &anyhow::Error| Some(Duration::from_millis(500)),
        || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(anyhow!("throttled"))
            }
        },
    )
    .await;

    assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
    assert!(
        started.elapsed() >= Duration::from_millis(450),
        "The hinted delay should be used instead of the 1ms backoff"
    );

    Ok(())
}

/// Test: Without a hint the hinted variant behaves like plain backoff
#[tokio::test]
async fn test_hinted_variant_falls_back_to_backoff() -> Result<()> {
    let config = RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 10,
        max_delay_ms: 100,
        backoff_multiplier: 2,
    };

    let attempt_count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempt_count);

    let result = retry_with_backoff_hinted(
        &config,
        |_e: &anyhow::Error| None,
        || {
            let counter = Arc::clone(&counter);
            async move {
                let attempts = counter.fetch_add(1, Ordering::SeqCst);
                if attempts == 0 {
                    Err(anyhow!("transient"))
                } else {
                    Ok("success")
                }
            }
        },
    )
    .await?;

    assert_eq!(result, "success");
    assert_eq!(attempt_count.load(Ordering::SeqCst), 2);

    Ok(())
}
