//! Signal posting, delivery, and return over the mock platform.

use kernel::signal::{
    deliver_pending, send_signal, set_handler, set_signal_mask, sig_mask, sigreturn, SigAction,
    SignalError, SIGCONT, SIGKILL, SIGSTOP, SIGRETURN_TRAMPOLINE, SIGRETURN_TRAMPOLINE_SIZE,
    SIG_IGN,
};
use kernel::signal::constants::{SIGHUP, SIGTERM, SIGUSR1, SIGUSR2};
use kernel::process::Pid;
use kernel::task::scheduler::is_schedulable;
use kernel::task::{kthread_create, ThreadState};
use kernel::task::sleep::Channel;
use kernel::test_support as ts;

#[test]
fn send_rejects_bad_numbers_and_unknown_pids() {
    ts::run_isolated(|| {
        let (_, pid) = ts::stage_process("target");
        assert_eq!(send_signal(pid, 0), Err(SignalError::InvalidSignal));
        assert_eq!(send_signal(pid, 99), Err(SignalError::InvalidSignal));
        assert_eq!(
            send_signal(Pid::NONE, SIGTERM),
            Err(SignalError::NotFound)
        );
    });
}

#[test]
fn send_to_an_ignoring_process_is_a_quiet_success() {
    ts::run_isolated(|| {
        let (p, pid) = ts::stage_process("deaf");
        ts::with_current(p, 0, || {
            set_handler(
                SIGUSR1,
                Some(SigAction {
                    handler: SIG_IGN,
                    mask: 0,
                }),
            )
            .unwrap();
        });

        assert_eq!(send_signal(pid, SIGUSR1), Ok(()));
        assert_eq!(p.inner.lock().signals.pending, 0);

        // Kill cannot be ignored away.
        assert_eq!(send_signal(pid, SIGKILL), Ok(()));
        assert_ne!(p.inner.lock().signals.pending & sig_mask(SIGKILL), 0);
    });
}

#[test]
fn send_to_a_zombie_fails() {
    ts::run_isolated(|| {
        let (p, pid) = ts::stage_process("walking-dead");
        ts::make_zombie(p, 0);
        assert_eq!(send_signal(pid, SIGTERM), Err(SignalError::NotFound));
    });
}

#[test]
fn handler_registration_round_trips() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("handlers");
        ts::with_current(p, 0, || {
            let custom = SigAction {
                handler: 0x4242_0000,
                mask: sig_mask(SIGHUP),
            };
            let old = set_handler(SIGUSR1, Some(custom)).unwrap();
            assert_eq!(old, SigAction::DEFAULT);

            let old2 = set_handler(SIGUSR1, Some(SigAction::DEFAULT)).unwrap();
            assert_eq!(old2, custom);

            // Querying without replacing leaves the table alone.
            let old3 = set_handler(SIGUSR1, None).unwrap();
            assert_eq!(old3, SigAction::DEFAULT);

            assert_eq!(
                set_handler(SIGKILL, Some(custom)),
                Err(SignalError::ProtectedSignal)
            );
            assert_eq!(
                set_handler(SIGSTOP, None),
                Err(SignalError::ProtectedSignal)
            );
            assert_eq!(set_handler(0, None), Err(SignalError::InvalidSignal));
        });
    });
}

#[test]
fn mask_updates_return_the_previous_mask_and_spare_the_protected_pair() {
    ts::run_isolated(|| {
        let (p, _) = ts::stage_process("masked");
        ts::with_current(p, 0, || {
            assert_eq!(set_signal_mask(sig_mask(SIGUSR1)), 0);
            let prev = set_signal_mask(u32::MAX);
            assert_eq!(prev, sig_mask(SIGUSR1));
        });
        let inner = p.inner.lock();
        assert_eq!(inner.signals.blocked & sig_mask(SIGKILL), 0);
        assert_eq!(inner.signals.blocked & sig_mask(SIGSTOP), 0);
        assert_ne!(inner.signals.blocked & sig_mask(SIGTERM), 0);
    });
}

#[test]
fn stop_continue_and_kill_drive_scheduler_eligibility() {
    ts::run_isolated(|| {
        let (p, pid) = ts::stage_process("job");
        let t0 = &p.threads[0];

        // Two more threads, as a real multi-threaded process would have.
        let (tid1, tid2) = ts::with_current(p, 0, || {
            (
                kthread_create(0x6000, 0x2000).unwrap(),
                kthread_create(0x6000, 0x3000).unwrap(),
            )
        });
        assert_ne!(tid1, tid2);

        // Stop: the process leaves the scheduler's view.
        send_signal(pid, SIGSTOP).unwrap();
        deliver_pending(p, t0);
        {
            let inner = p.inner.lock();
            assert!(inner.signals.stopped);
            assert!(!is_schedulable(&inner));
        }

        // A pending, unblocked continue makes it eligible again even
        // before delivery, then delivery clears the stop.
        send_signal(pid, SIGCONT).unwrap();
        assert!(is_schedulable(&p.inner.lock()));
        deliver_pending(p, t0);
        {
            let inner = p.inner.lock();
            assert!(!inner.signals.stopped);
            assert!(is_schedulable(&inner));
        }

        // Park the two extra threads in a sleep.
        for t in &p.threads[1..3] {
            let mut tg = t.inner.lock();
            tg.state = ThreadState::Sleeping;
            tg.chan = Some(Channel::of(p));
        }

        // Kill punches through a full mask and a stopped state.
        ts::with_current(p, 0, || {
            set_signal_mask(u32::MAX);
        });
        send_signal(pid, SIGSTOP).unwrap();
        deliver_pending(p, t0);
        assert!(p.inner.lock().signals.stopped);

        send_signal(pid, SIGKILL).unwrap();
        assert!(is_schedulable(&p.inner.lock()));
        deliver_pending(p, t0);

        let inner = p.inner.lock();
        assert!(inner.killed);
        assert!(!inner.signals.stopped);
        drop(inner);
        for t in &p.threads[1..3] {
            assert_eq!(t.inner.lock().state, ThreadState::Runnable);
        }

        let logs = ts::captured_logs();
        assert!(logs.iter().any(|l| l.contains("killed by SIGKILL")));
    });
}

#[test]
fn ascending_delivery_order_lets_a_later_stop_win() {
    ts::run_isolated(|| {
        let (p, pid) = ts::stage_process("ordered");
        send_signal(pid, SIGSTOP).unwrap();
        send_signal(pid, SIGCONT).unwrap();
        deliver_pending(p, &p.threads[0]);
        // Continue (18) delivers before stop (19), so the stop lands
        // last and the process ends up stopped.
        assert!(p.inner.lock().signals.stopped);
    });
}

#[test]
fn user_delivery_redirects_the_thread_and_sigreturn_undoes_it() {
    ts::run_isolated(|| {
        let (p, pid) = ts::stage_process("handled");
        let t = &p.threads[0];

        let handler = SigAction {
            handler: 0x5000,
            mask: sig_mask(SIGUSR2),
        };
        ts::with_current(p, 0, || {
            set_signal_mask(sig_mask(SIGHUP));
            set_handler(SIGUSR1, Some(handler)).unwrap();
        });

        // The interrupted user state we expect to get back.
        let before = {
            let frames = p.data_mut().trap_frames.as_mut().unwrap();
            let frame = frames.frame_mut(0);
            frame.epc = 0x1234;
            frame.sp = 0x8000;
            frame.a0 = 7;
            frame.t0 = 0xdead;
            frame.s11 = 0xbeef;
            *frame
        };
        let mask_before = p.inner.lock().signals.blocked;

        send_signal(pid, SIGUSR1).unwrap();
        deliver_pending(p, t);

        let frame = *p.data().trap_frames.as_ref().unwrap().frame(0);
        let expected_sp = 0x8000 - SIGRETURN_TRAMPOLINE.len() as u64;
        assert_eq!(frame.sp, expected_sp);
        assert_eq!(frame.ra, expected_sp, "handler returns into the trampoline");
        assert_eq!(frame.a0, SIGUSR1 as u64);
        assert_eq!(frame.epc, 0x5000);

        // The trampoline bytes sit below the interrupted stack pointer.
        let mut written = [0u8; SIGRETURN_TRAMPOLINE_SIZE];
        p.data()
            .addr_space
            .as_ref()
            .unwrap()
            .copy_in(expected_sp, &mut written)
            .unwrap();
        assert_eq!(written, SIGRETURN_TRAMPOLINE);

        {
            let inner = p.inner.lock();
            assert_eq!(inner.signals.pending & sig_mask(SIGUSR1), 0);
            // Handler mask plus self-block, installed until sigreturn.
            assert_eq!(
                inner.signals.blocked,
                sig_mask(SIGUSR2) | sig_mask(SIGUSR1)
            );
            assert_eq!(inner.signals.mask_backup, mask_before);
        }

        // The snapshot matches the interrupted state exactly.
        assert_eq!(**t.data().trap_backup.as_ref().unwrap(), before);

        sigreturn(p, t);
        let restored = *p.data().trap_frames.as_ref().unwrap().frame(0);
        assert_eq!(restored, before, "register state restored byte for byte");
        assert_eq!(p.inner.lock().signals.blocked, mask_before);
    });
}

#[test]
fn delivery_respects_the_blocked_mask() {
    ts::run_isolated(|| {
        let (p, pid) = ts::stage_process("blocked");
        ts::with_current(p, 0, || {
            set_handler(
                SIGUSR1,
                Some(SigAction {
                    handler: 0x5000,
                    mask: 0,
                }),
            )
            .unwrap();
            set_signal_mask(sig_mask(SIGUSR1));
        });
        {
            let frames = p.data_mut().trap_frames.as_mut().unwrap();
            frames.frame_mut(0).sp = 0x8000;
        }

        send_signal(pid, SIGUSR1).unwrap();
        deliver_pending(p, &p.threads[0]);

        // Still pending, frame untouched.
        let inner = p.inner.lock();
        assert_ne!(inner.signals.pending & sig_mask(SIGUSR1), 0);
        drop(inner);
        assert_eq!(p.data().trap_frames.as_ref().unwrap().frame(0).epc, 0);
    });
}
