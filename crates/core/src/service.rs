use std::sync::Arc;

use crate::attendance::AttendanceRecorder;
use crate::capacity::CapacityLedger;
use crate::checkin_request::CheckInRequestService;
use crate::clock::Clock;
use crate::config::CheckInPolicy;
use crate::store::SharedStore;
use crate::waitlist::WaitlistCoordinator;

/// The check-in components wired against one store and clock.
#[derive(Clone)]
pub struct CheckInServices {
    pub ledger: CapacityLedger,
    pub waitlist: WaitlistCoordinator,
    pub attendance: AttendanceRecorder,
    pub requests: CheckInRequestService,
}

impl CheckInServices {
    pub fn new(store: SharedStore, clock: Arc<dyn Clock>, policy: CheckInPolicy) -> Self {
        let waitlist = WaitlistCoordinator::new(store.clone(), policy.roster_attempts);
        let ledger = CapacityLedger::new(store.clone(), waitlist.clone());
        let attendance = AttendanceRecorder::new(store.clone(), ledger.clone(), clock.clone());
        let requests =
            CheckInRequestService::new(store, ledger.clone(), attendance.clone(), clock, policy);
        Self {
            ledger,
            waitlist,
            attendance,
            requests,
        }
    }
}
