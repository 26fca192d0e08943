//! # Módulo de Retry - Backoff Exponencial Limitado
//!
//! Implementa a política de repetição usada pelo laço de tentativas do
//! ciclo de vida de step (§4.7, passo 3.e): entre tentativas falhas, espera
//! `min(2^attempt, 10)` segundos antes de tentar de novo.
//!
//! ## Para todos entenderem:
//!
//! Não existe aqui uma escolha de estratégia (retry/fail_fast/ignore) como
//! no motor anterior: a única decisão de um step é "quantas vezes tentar
//! de novo" (`retry_times`), e a política de esperar mais a cada tentativa
//! é fixa. A decisão de "parar tudo na primeira falha" pertence ao
//! `GlobalConfig.fail_fast` do caso de teste (C8), não a este módulo.
//!
//! Grounding: `original_source/.../executor/step_executor.py`'s laço
//! `for attempt in range(retry_times + 1)` com
//! `time.sleep(min(2 ** attempt, 10))` entre tentativas falhas.

use std::time::Duration;

/// Calcula o tempo de espera antes da tentativa `attempt` (0-based, a
/// tentativa que acabou de falhar), em segundos, limitado a 10s.
pub fn backoff_seconds(attempt: u32) -> f64 {
    2f64.powi(attempt as i32).min(10.0)
}

pub fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs_f64(backoff_seconds(attempt))
}

/// Aguarda o backoff correspondente à tentativa que acabou de falhar.
pub async fn sleep_backoff(attempt: u32) {
    tokio::time::sleep(backoff_duration(attempt)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_then_caps() {
        assert_eq!(backoff_seconds(0), 1.0);
        assert_eq!(backoff_seconds(1), 2.0);
        assert_eq!(backoff_seconds(2), 4.0);
        assert_eq!(backoff_seconds(3), 8.0);
        assert_eq!(backoff_seconds(4), 10.0);
        assert_eq!(backoff_seconds(10), 10.0);
    }

    #[tokio::test]
    async fn sleep_backoff_completes() {
        sleep_backoff(0).await;
    }
}
