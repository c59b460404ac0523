use roster_core::db::{open_db_with_config, DbConfig};
use roster_core::{
    CrudRepository, Member, MemberRepository, RepoError, Session, SqliteMemberRepository,
};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

fn open(path: &Path) -> Connection {
    open_db_with_config(path, &DbConfig::with_busy_timeout(Duration::from_millis(100))).unwrap()
}

fn seed(path: &Path) {
    let mut conn = open(path);
    let session = Session::begin(&mut conn).unwrap();
    {
        let members = SqliteMemberRepository::try_new(&session).unwrap();
        members.save(Member::with_age("member1", 10)).unwrap();
    }
    session.commit().unwrap();
}

#[test]
fn pessimistic_lock_blocks_concurrent_writer_until_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locking.db");
    seed(&path);

    let mut holder_conn = open(&path);
    let mut writer_conn = open(&path);

    let holder = Session::begin(&mut holder_conn).unwrap();
    let holder_members = SqliteMemberRepository::try_new(&holder).unwrap();
    let locked = holder_members.find_lock_by_username("member1").unwrap();
    assert_eq!(locked.len(), 1);

    {
        let writer = Session::begin(&mut writer_conn).unwrap();
        let writer_members = SqliteMemberRepository::try_new(&writer).unwrap();

        // Readers are not blocked by the held write lock.
        assert_eq!(writer_members.find_by_username("member1").unwrap().len(), 1);

        match writer_members.save(Member::with_age("member2", 20)) {
            Err(RepoError::ConcurrencyConflict(_)) => {}
            other => panic!("expected lock conflict, got {:?}", other.map(|_| ())),
        }
    }

    locked[0].borrow_mut().age = 11;
    drop(holder_members);
    holder.commit().unwrap();

    let writer = Session::begin(&mut writer_conn).unwrap();
    {
        let writer_members = SqliteMemberRepository::try_new(&writer).unwrap();
        writer_members.save(Member::with_age("member2", 20)).unwrap();
        let member1 = writer_members.find_by_username("member1").unwrap();
        assert_eq!(member1[0].borrow().age, 11);
    }
    writer.commit().unwrap();
}

#[test]
fn lock_query_without_matches_takes_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty_lock.db");
    seed(&path);

    let mut conn = open(&path);
    let session = Session::begin(&mut conn).unwrap();
    let members = SqliteMemberRepository::try_new(&session).unwrap();
    assert!(members.find_lock_by_username("nobody").unwrap().is_empty());
    assert_eq!(members.count().unwrap(), 1);
}

#[test]
fn lock_query_conflicts_while_another_session_holds_the_write_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("held_lock.db");
    seed(&path);

    let mut writer_conn = open(&path);
    let mut locker_conn = open(&path);

    let writer = Session::begin(&mut writer_conn).unwrap();
    {
        let writer_members = SqliteMemberRepository::try_new(&writer).unwrap();
        writer_members.save(Member::with_age("member2", 20)).unwrap();
    }

    {
        let locker = Session::begin(&mut locker_conn).unwrap();
        let locker_members = SqliteMemberRepository::try_new(&locker).unwrap();
        match locker_members.find_lock_by_username("member1") {
            Err(RepoError::ConcurrencyConflict(_)) => {}
            other => panic!("expected lock conflict, got {:?}", other.map(|_| ())),
        }
    }

    writer.commit().unwrap();

    let locker = Session::begin(&mut locker_conn).unwrap();
    {
        let locker_members = SqliteMemberRepository::try_new(&locker).unwrap();
        let locked = locker_members.find_lock_by_username("member1").unwrap();
        assert_eq!(locked.len(), 1);
        assert_eq!(locker_members.count().unwrap(), 2);
    }
    locker.commit().unwrap();
}
