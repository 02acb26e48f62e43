//! Shared test harness: mock handles and an in-process message network.
